use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Opaque handle to a node in one of the page's documents (main document,
/// shadow trees, same-origin frames or an auxiliary PiP window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Handle for a registered media event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Handle for a node-added subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Rendered bounding box in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// A collapsed box (hidden or removed element)
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Video,
    Source,
    Iframe,
    Input,
    TextArea,
    Element,
}

/// The subset of computed style the locator cares about
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f64,
}

impl Visibility {
    pub fn is_hidden(&self) -> bool {
        self.display_none || self.visibility_hidden || self.opacity <= 0.0
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
        }
    }
}

/// Point-in-time media state of a `<video>` element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSnapshot {
    pub paused: bool,
    pub muted: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub volume: f64,
    pub playback_rate: f64,
    /// `None` when unknown or a live stream
    pub duration: Option<f64>,
    pub current_time: f64,
    /// HTMLMediaElement readyState (0 = HAVE_NOTHING)
    pub ready_state: u8,
    pub src: Option<String>,
    pub current_src: Option<String>,
}

impl Default for MediaSnapshot {
    fn default() -> Self {
        Self {
            paused: true,
            muted: false,
            looping: false,
            volume: 1.0,
            playback_rate: 1.0,
            duration: None,
            current_time: 0.0,
            ready_state: 0,
            src: None,
            current_src: None,
        }
    }
}

impl MediaSnapshot {
    pub fn is_playing(&self) -> bool {
        !self.paused && self.current_time > 0.0
    }

    pub fn has_source_attr(&self) -> bool {
        self.src.as_deref().is_some_and(|s| !s.is_empty())
            || self.current_src.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Duration usable for clamping; non-finite or unknown yields `None`
    pub fn finite_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite())
    }
}

/// Media element events a listener can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaEventKind {
    Play,
    Pause,
}

/// A captured video frame exported as an encoded image
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Read-only view of a frame context's DOM and layout
pub trait DomTree {
    /// Root of the frame's main document
    fn document(&self) -> NodeId;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn kind(&self, node: NodeId) -> Option<ElementKind>;

    fn shadow_root(&self, node: NodeId) -> Option<NodeId>;

    /// Document of an iframe. Cross-origin frames fail with a security error.
    fn frame_document(&self, iframe: NodeId) -> Result<Option<NodeId>, PlatformError>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element hosting a shadow root or iframe document
    fn host(&self, root: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Whether the node is reachable from a live document root
    fn is_connected(&self, node: NodeId) -> bool;

    fn bounding_rect(&self, node: NodeId) -> Rect;

    fn visibility(&self, node: NodeId) -> Visibility;

    fn media(&self, node: NodeId) -> Option<MediaSnapshot>;

    /// Raw `style` attribute, `None` if the attribute is absent
    fn style_attribute(&self, node: NodeId) -> Option<String>;

    /// Whether keyboard focus is inside a text input or editable region
    fn focus_is_editable(&self) -> bool;

    fn title(&self) -> String;

    fn url(&self) -> String;

    fn viewport(&self) -> Rect;
}

/// Mutating capabilities on page elements: media transport, styling and DOM moves
pub trait MediaSurface {
    fn play(&self, video: NodeId) -> Result<(), PlatformError>;

    fn pause(&self, video: NodeId);

    fn set_current_time(&self, video: NodeId, seconds: f64);

    fn set_volume(&self, video: NodeId, volume: f64);

    fn set_muted(&self, video: NodeId, muted: bool);

    fn set_playback_rate(&self, video: NodeId, rate: f64);

    fn set_loop(&self, video: NodeId, looping: bool);

    /// Replace the `style` attribute; `None` removes it
    fn set_style_attribute(&self, node: NodeId, style: Option<&str>);

    fn set_style_property(&self, node: NodeId, name: &str, value: &str, important: bool);

    fn toggle_class(&self, node: NodeId, class: &str, on: bool);

    /// Move `node` under `parent`, before `reference` or appended when `None`
    fn insert_before(
        &self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), PlatformError>;

    fn add_media_listener(&self, video: NodeId, events: &[MediaEventKind]) -> ListenerId;

    fn remove_media_listener(&self, listener: ListenerId);

    /// Draw the current frame to an offscreen canvas and export it
    fn capture_frame(&self, video: NodeId) -> Result<FrameImage, PlatformError>;
}

/// A full page capability set for one frame context
pub trait Page: DomTree + MediaSurface {}

impl<T: DomTree + MediaSurface + ?Sized> Page for T {}

/// "Notify on node-added events under a given subtree root"
pub trait MutationSource {
    fn subscribe(&self, root: NodeId, listener: Box<dyn FnMut(NodeId)>) -> SubscriptionId;

    fn unsubscribe(&self, subscription: SubscriptionId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_helpers() {
        let rect = Rect::new(10.0, 20.0, 640.0, 360.0);
        assert_eq!(rect.area(), 230_400.0);
        assert_eq!(rect.bottom(), 380.0);
        assert_eq!(rect.center_x(), 330.0);
        assert!(!rect.is_empty());
        assert!(Rect::new(0.0, 0.0, 0.0, 100.0).is_empty());
    }

    #[test]
    fn test_visibility_hidden() {
        assert!(!Visibility::default().is_hidden());
        let faded = Visibility {
            opacity: 0.0,
            ..Visibility::default()
        };
        assert!(faded.is_hidden());
    }

    #[test]
    fn test_media_snapshot_defaults() {
        let snapshot: MediaSnapshot = serde_json::from_str(r#"{"paused": false, "current_time": 4.0}"#).unwrap();
        assert!(snapshot.is_playing());
        assert_eq!(snapshot.volume, 1.0);
        assert!(!snapshot.has_source_attr());
        assert_eq!(snapshot.finite_duration(), None);
    }
}
