use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::debug;

use crate::dom::{
    DomTree, ElementKind, FrameImage, ListenerId, MediaEventKind, MediaSnapshot, MediaSurface, MutationSource,
    NodeId, Rect, SubscriptionId, Visibility,
};
use crate::error::PlatformError;
use crate::pip::PageEvent;

type Listener = Rc<RefCell<Box<dyn FnMut(NodeId)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameAccess {
    SameOrigin(NodeId),
    CrossOrigin,
}

#[derive(Debug, Clone)]
struct SimNode {
    kind: ElementKind,
    parent: Option<NodeId>,
    /// Host element, for shadow roots
    host: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    frame: Option<FrameAccess>,
    /// Document roots (main document, frame documents, PiP window bodies)
    root: bool,
    live: bool,
    rect: Rect,
    visibility: Visibility,
    media: Option<MediaSnapshot>,
    style: Option<String>,
    classes: BTreeSet<String>,
}

impl SimNode {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            parent: None,
            host: None,
            children: Vec::new(),
            shadow_root: None,
            frame: None,
            root: false,
            live: false,
            rect: Rect::default(),
            visibility: Visibility::default(),
            media: None,
            style: None,
            classes: BTreeSet::new(),
        }
    }
}

struct PageState {
    nodes: Vec<SimNode>,
    document: NodeId,
    title: String,
    url: String,
    viewport: Rect,
    focus_editable: bool,
    listeners: BTreeMap<ListenerId, (NodeId, Vec<MediaEventKind>)>,
    subscriptions: BTreeMap<SubscriptionId, (NodeId, Listener)>,
    next_id: u64,
    events: Vec<PageEvent>,
    play_error: Option<PlatformError>,
    capture_error: Option<PlatformError>,
    insert_error: Option<PlatformError>,
}

impl PageState {
    fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut SimNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn push(&mut self, node: SimNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(node);
        id
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Parent, or the host for a shadow root
    fn up(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id)?;
        node.parent.or(node.host)
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            let Some(node) = self.node(current) else {
                return false;
            };
            if node.root {
                return node.live;
            }
            match self.up(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    fn is_inside(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.up(node);
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        let parent = self.node(id).and_then(|node| node.parent);
        if let Some(parent) = parent {
            if let Some(parent_node) = self.node_mut(parent) {
                parent_node.children.retain(|child| *child != id);
            }
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    fn emit_media(&mut self, video: NodeId, kind: MediaEventKind) {
        let listeners: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|(_, (node, kinds))| *node == video && kinds.contains(&kind))
            .map(|(id, _)| *id)
            .collect();
        for listener in listeners {
            self.events.push(PageEvent::Media { listener, video, kind });
        }
    }
}

/// In-memory page: an arena DOM with media state, styles and listeners.
///
/// Media play/pause events are queued and handed out by [`SimPage::take_events`]
/// so callers decide when they are delivered.
pub struct SimPage {
    state: RefCell<PageState>,
}

impl SimPage {
    pub fn new(url: &str, title: &str) -> Self {
        let mut document = SimNode::new(ElementKind::Element);
        document.root = true;
        document.live = true;
        Self {
            state: RefCell::new(PageState {
                nodes: vec![document],
                document: NodeId(0),
                title: title.to_string(),
                url: url.to_string(),
                viewport: Rect::new(0.0, 0.0, 1280.0, 800.0),
                focus_editable: false,
                listeners: BTreeMap::new(),
                subscriptions: BTreeMap::new(),
                next_id: 0,
                events: Vec::new(),
                play_error: None,
                capture_error: None,
                insert_error: None,
            }),
        }
    }

    /// Append a plain element under `parent`
    pub fn add_element(&self, parent: NodeId, kind: ElementKind) -> NodeId {
        let id = {
            let mut state = self.state.borrow_mut();
            let mut node = SimNode::new(kind);
            node.parent = Some(parent);
            let id = state.push(node);
            if let Some(parent_node) = state.node_mut(parent) {
                parent_node.children.push(id);
            }
            id
        };
        self.notify_added(id);
        id
    }

    /// Append a `<video>` with the given layout and media state
    pub fn add_video(&self, parent: NodeId, rect: Rect, media: MediaSnapshot) -> NodeId {
        let id = {
            let mut state = self.state.borrow_mut();
            let mut node = SimNode::new(ElementKind::Video);
            node.parent = Some(parent);
            node.rect = rect;
            node.media = Some(media);
            let id = state.push(node);
            if let Some(parent_node) = state.node_mut(parent) {
                parent_node.children.push(id);
            }
            id
        };
        self.notify_added(id);
        id
    }

    /// Attach a shadow root to `host`
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        let mut state = self.state.borrow_mut();
        let mut root = SimNode::new(ElementKind::Element);
        root.host = Some(host);
        let id = state.push(root);
        if let Some(host_node) = state.node_mut(host) {
            host_node.shadow_root = Some(id);
        }
        id
    }

    /// Append an iframe. Same-origin frames get a traversable document root.
    pub fn add_iframe(&self, parent: NodeId, rect: Rect, same_origin: bool) -> (NodeId, Option<NodeId>) {
        let iframe = self.add_element(parent, ElementKind::Iframe);
        let mut state = self.state.borrow_mut();
        if let Some(node) = state.node_mut(iframe) {
            node.rect = rect;
        }

        if !same_origin {
            if let Some(node) = state.node_mut(iframe) {
                node.frame = Some(FrameAccess::CrossOrigin);
            }
            return (iframe, None);
        }

        let mut document = SimNode::new(ElementKind::Element);
        document.root = true;
        document.live = true;
        document.host = Some(iframe);
        let frame_root = state.push(document);
        if let Some(node) = state.node_mut(iframe) {
            node.frame = Some(FrameAccess::SameOrigin(frame_root));
        }
        (iframe, Some(frame_root))
    }

    /// Body of a freshly opened auxiliary window
    pub fn create_window_root(&self) -> NodeId {
        let mut state = self.state.borrow_mut();
        let mut body = SimNode::new(ElementKind::Element);
        body.root = true;
        body.live = true;
        state.push(body)
    }

    /// Mark an auxiliary window's document as gone
    pub fn retire_root(&self, root: NodeId) {
        if let Some(node) = self.state.borrow_mut().node_mut(root) {
            node.live = false;
        }
    }

    /// Detach `node` from its parent (an SPA re-render removing it)
    pub fn remove(&self, node: NodeId) {
        self.state.borrow_mut().detach(node);
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.rect = rect;
        }
    }

    pub fn set_visibility(&self, node: NodeId, visibility: Visibility) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.visibility = visibility;
        }
    }

    pub fn update_media(&self, video: NodeId, update: impl FnOnce(&mut MediaSnapshot)) {
        if let Some(media) = self.state.borrow_mut().node_mut(video).and_then(|n| n.media.as_mut()) {
            update(media);
        }
    }

    pub fn set_focus_editable(&self, editable: bool) {
        self.state.borrow_mut().focus_editable = editable;
    }

    pub fn set_viewport(&self, viewport: Rect) {
        self.state.borrow_mut().viewport = viewport;
    }

    pub fn set_play_error(&self, error: Option<PlatformError>) {
        self.state.borrow_mut().play_error = error;
    }

    pub fn set_capture_error(&self, error: Option<PlatformError>) {
        self.state.borrow_mut().capture_error = error;
    }

    /// Make every subsequent `insert_before` fail
    pub fn set_insert_error(&self, error: Option<PlatformError>) {
        self.state.borrow_mut().insert_error = error;
    }

    /// Drain queued media events
    pub fn take_events(&self) -> Vec<PageEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Value of one inline declaration, `!important` included
    pub fn style_property(&self, node: NodeId, name: &str) -> Option<String> {
        let style = self.style_attribute(node)?;
        parse_declarations(&style)
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Whether `node` sits under `ancestor` (through shadow hosts too)
    pub fn is_inside(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.state.borrow().is_inside(node, ancestor)
    }

    fn notify_added(&self, added: NodeId) {
        let targets: Vec<Listener> = {
            let state = self.state.borrow();
            state
                .subscriptions
                .values()
                .filter(|(root, _)| state.is_inside(added, *root))
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in targets {
            (listener.borrow_mut())(added);
        }
    }
}

impl DomTree for SimPage {
    fn document(&self) -> NodeId {
        self.state.borrow().document
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn kind(&self, node: NodeId) -> Option<ElementKind> {
        self.state.borrow().node(node).map(|n| n.kind)
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().node(node).and_then(|n| n.shadow_root)
    }

    fn frame_document(&self, iframe: NodeId) -> Result<Option<NodeId>, PlatformError> {
        match self.state.borrow().node(iframe).and_then(|n| n.frame) {
            Some(FrameAccess::SameOrigin(root)) => Ok(Some(root)),
            Some(FrameAccess::CrossOrigin) => Err(PlatformError::Security("Blocked a frame with a different origin".to_string())),
            None => Ok(None),
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().node(node).and_then(|n| n.parent)
    }

    fn host(&self, root: NodeId) -> Option<NodeId> {
        self.state.borrow().node(root).and_then(|n| n.host)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        let parent = state.node(node)?.parent?;
        let siblings = &state.node(parent)?.children;
        let position = siblings.iter().position(|child| *child == node)?;
        siblings.get(position + 1).copied()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.state.borrow().is_connected(node)
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        let state = self.state.borrow();
        match state.node(node) {
            Some(n) if state.is_connected(node) && !n.visibility.display_none => n.rect,
            _ => Rect::default(),
        }
    }

    fn visibility(&self, node: NodeId) -> Visibility {
        self.state
            .borrow()
            .node(node)
            .map(|n| n.visibility)
            .unwrap_or_default()
    }

    fn media(&self, node: NodeId) -> Option<MediaSnapshot> {
        self.state.borrow().node(node).and_then(|n| n.media.clone())
    }

    fn style_attribute(&self, node: NodeId) -> Option<String> {
        self.state.borrow().node(node).and_then(|n| n.style.clone())
    }

    fn focus_is_editable(&self) -> bool {
        self.state.borrow().focus_editable
    }

    fn title(&self) -> String {
        self.state.borrow().title.clone()
    }

    fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    fn viewport(&self) -> Rect {
        self.state.borrow().viewport
    }
}

impl MediaSurface for SimPage {
    fn play(&self, video: NodeId) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.play_error.clone() {
            return Err(error);
        }
        let was_paused = match state.node_mut(video).and_then(|n| n.media.as_mut()) {
            Some(media) => std::mem::replace(&mut media.paused, false),
            None => return Err(PlatformError::NotAttached),
        };
        if was_paused {
            state.emit_media(video, MediaEventKind::Play);
        }
        Ok(())
    }

    fn pause(&self, video: NodeId) {
        let mut state = self.state.borrow_mut();
        let was_playing = state
            .node_mut(video)
            .and_then(|n| n.media.as_mut())
            .is_some_and(|media| !std::mem::replace(&mut media.paused, true));
        if was_playing {
            state.emit_media(video, MediaEventKind::Pause);
        }
    }

    fn set_current_time(&self, video: NodeId, seconds: f64) {
        self.update_media(video, |media| media.current_time = seconds);
    }

    fn set_volume(&self, video: NodeId, volume: f64) {
        self.update_media(video, |media| media.volume = volume);
    }

    fn set_muted(&self, video: NodeId, muted: bool) {
        self.update_media(video, |media| media.muted = muted);
    }

    fn set_playback_rate(&self, video: NodeId, rate: f64) {
        self.update_media(video, |media| media.playback_rate = rate);
    }

    fn set_loop(&self, video: NodeId, looping: bool) {
        self.update_media(video, |media| media.looping = looping);
    }

    fn set_style_attribute(&self, node: NodeId, style: Option<&str>) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            n.style = style.map(str::to_string);
        }
    }

    fn set_style_property(&self, node: NodeId, name: &str, value: &str, important: bool) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            let mut declarations = parse_declarations(n.style.as_deref().unwrap_or(""));
            let value = if important {
                format!("{} !important", value)
            } else {
                value.to_string()
            };
            match declarations.iter_mut().find(|(existing, _)| existing == name) {
                Some(declaration) => declaration.1 = value,
                None => declarations.push((name.to_string(), value)),
            }
            n.style = Some(
                declarations
                    .iter()
                    .map(|(name, value)| format!("{}: {};", name, value))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
    }

    fn toggle_class(&self, node: NodeId, class: &str, on: bool) {
        if let Some(n) = self.state.borrow_mut().node_mut(node) {
            if on {
                n.classes.insert(class.to_string());
            } else {
                n.classes.remove(class);
            }
        }
    }

    fn insert_before(&self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.insert_error.clone() {
            return Err(error);
        }
        if state.node(parent).is_none() || state.node(node).is_none() {
            return Err(PlatformError::NotAttached);
        }
        if state.is_inside(parent, node) {
            return Err(PlatformError::Failed("HierarchyRequestError".to_string()));
        }
        if let Some(reference) = reference {
            if state.node(reference).and_then(|n| n.parent) != Some(parent) {
                return Err(PlatformError::Failed("reference is not a child of parent".to_string()));
            }
        }

        state.detach(node);
        let Some(parent_node) = state.node_mut(parent) else {
            return Err(PlatformError::NotAttached);
        };
        let position = reference
            .and_then(|r| parent_node.children.iter().position(|child| *child == r))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(position, node);
        if let Some(n) = state.node_mut(node) {
            n.parent = Some(parent);
        }
        debug!("DOM move {:?} -> {:?} before {:?}", node, parent, reference);
        Ok(())
    }

    fn add_media_listener(&self, video: NodeId, events: &[MediaEventKind]) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next());
        state.listeners.insert(id, (video, events.to_vec()));
        id
    }

    fn remove_media_listener(&self, listener: ListenerId) {
        self.state.borrow_mut().listeners.remove(&listener);
    }

    fn capture_frame(&self, video: NodeId) -> Result<FrameImage, PlatformError> {
        let state = self.state.borrow();
        if let Some(error) = state.capture_error.clone() {
            return Err(error);
        }
        let node = state.node(video).ok_or(PlatformError::NotAttached)?;
        Ok(FrameImage {
            width: node.rect.width.max(0.0) as u32,
            height: node.rect.height.max(0.0) as u32,
            mime: "image/png".to_string(),
            bytes: b"\x89PNG\r\n\x1a\n".to_vec(),
        })
    }
}

impl MutationSource for SimPage {
    fn subscribe(&self, root: NodeId, listener: Box<dyn FnMut(NodeId)>) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next());
        state.subscriptions.insert(id, (root, Rc::new(RefCell::new(listener))));
        id
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.state.borrow_mut().subscriptions.remove(&subscription);
    }
}

fn parse_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_property_merges() {
        let page = SimPage::new("https://example.com/", "t");
        let body = page.document();
        let video = page.add_video(body, Rect::new(0.0, 0.0, 640.0, 360.0), MediaSnapshot::default());
        page.set_style_attribute(video, Some("color: red;"));
        page.set_style_property(video, "width", "100%", true);
        page.set_style_property(video, "color", "blue", false);
        assert_eq!(page.style_attribute(video).as_deref(), Some("color: blue; width: 100% !important;"));
        assert_eq!(page.style_property(video, "width").as_deref(), Some("100% !important"));
    }

    #[test]
    fn test_insert_before_and_siblings() {
        let page = SimPage::new("https://example.com/", "t");
        let body = page.document();
        let a = page.add_element(body, ElementKind::Element);
        let b = page.add_element(body, ElementKind::Element);
        let c = page.add_element(body, ElementKind::Element);

        page.insert_before(body, c, Some(a)).unwrap();
        assert_eq!(page.children(body), vec![c, a, b]);
        assert_eq!(page.next_sibling(a), Some(b));
        assert!(page.insert_before(a, body, None).is_err());
    }

    #[test]
    fn test_removed_subtree_is_disconnected() {
        let page = SimPage::new("https://example.com/", "t");
        let body = page.document();
        let wrapper = page.add_element(body, ElementKind::Element);
        let video = page.add_video(wrapper, Rect::new(0.0, 0.0, 640.0, 360.0), MediaSnapshot::default());
        assert!(page.is_connected(video));

        page.remove(wrapper);
        assert!(!page.is_connected(wrapper));
        assert!(page.bounding_rect(video).is_empty());
    }

    #[test]
    fn test_play_queues_listener_events() {
        let page = SimPage::new("https://example.com/", "t");
        let video = page.add_video(page.document(), Rect::new(0.0, 0.0, 640.0, 360.0), MediaSnapshot::default());
        let listener = page.add_media_listener(video, &[MediaEventKind::Play, MediaEventKind::Pause]);

        page.play(video).unwrap();
        page.play(video).unwrap();
        page.pause(video);
        assert_eq!(
            page.take_events(),
            vec![
                PageEvent::Media { listener, video, kind: MediaEventKind::Play },
                PageEvent::Media { listener, video, kind: MediaEventKind::Pause },
            ]
        );
    }
}
