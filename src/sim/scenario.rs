use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;

use crate::capability::PipCapabilities;
use crate::dom::{DomTree, ElementKind, MediaSnapshot, MediaSurface, NodeId, Rect, Visibility};
use crate::error::PlatformError;

use super::page::SimPage;
use super::platform::SimPlatform;

/// A page description: url, platform capabilities and an element tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub url: String,
    pub title: String,
    pub viewport: Rect,
    pub capabilities: PipCapabilities,
    /// Make document PiP requests fail with this message
    pub document_error: Option<String>,
    /// Make native PiP requests fail with this message
    pub native_error: Option<String>,
    pub elements: Vec<ElementSpec>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            url: "https://example.com/watch".to_string(),
            title: "Untitled".to_string(),
            viewport: Rect::new(0.0, 0.0, 1280.0, 800.0),
            capabilities: PipCapabilities::default(),
            document_error: None,
            native_error: None,
            elements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementSpec {
    Video(VideoSpec),
    Container {
        #[serde(default)]
        children: Vec<ElementSpec>,
        /// Content of an attached shadow root
        #[serde(default)]
        shadow: Option<Vec<ElementSpec>>,
    },
    Iframe {
        rect: Rect,
        #[serde(default = "default_same_origin")]
        same_origin: bool,
        #[serde(default)]
        children: Vec<ElementSpec>,
    },
    Input,
}

fn default_same_origin() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSpec {
    pub rect: Rect,
    #[serde(default)]
    pub media: MediaSnapshot,
    #[serde(default)]
    pub hidden: bool,
    /// Number of `<source>` children
    #[serde(default)]
    pub sources: usize,
    #[serde(default)]
    pub style: Option<String>,
}

/// A built scenario
pub struct SimWorld {
    pub page: Rc<SimPage>,
    pub platform: Rc<SimPlatform>,
    /// Video nodes in declaration order
    pub videos: Vec<NodeId>,
}

impl Scenario {
    /// Load a `.toml` or `.json` scenario file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;

        let scenario = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(scenario)
    }

    pub fn build(&self) -> SimWorld {
        let page = Rc::new(SimPage::new(&self.url, &self.title));
        page.set_viewport(self.viewport);

        let platform = Rc::new(SimPlatform::new(page.clone(), self.capabilities));
        platform.fail_document(self.document_error.clone().map(PlatformError::Failed));
        platform.fail_native(self.native_error.clone().map(PlatformError::Failed));

        let mut videos = Vec::new();
        build_children(&page, page.document(), &self.elements, &mut videos);

        SimWorld { page, platform, videos }
    }
}

fn build_children(page: &SimPage, parent: NodeId, elements: &[ElementSpec], videos: &mut Vec<NodeId>) {
    for element in elements {
        match element {
            ElementSpec::Video(video) => {
                let node = page.add_video(parent, video.rect, video.media.clone());
                for _ in 0..video.sources {
                    page.add_element(node, ElementKind::Source);
                }
                if video.hidden {
                    page.set_visibility(
                        node,
                        Visibility {
                            display_none: true,
                            ..Visibility::default()
                        },
                    );
                }
                if let Some(style) = &video.style {
                    page.set_style_attribute(node, Some(style));
                }
                videos.push(node);
            }
            ElementSpec::Container { children, shadow } => {
                let node = page.add_element(parent, ElementKind::Element);
                build_children(page, node, children, videos);
                if let Some(shadow) = shadow {
                    let root = page.attach_shadow(node);
                    build_children(page, root, shadow, videos);
                }
            }
            ElementSpec::Iframe {
                rect,
                same_origin,
                children,
            } => {
                let (_, frame_root) = page.add_iframe(parent, *rect, *same_origin);
                if let Some(root) = frame_root {
                    build_children(page, root, children, videos);
                }
            }
            ElementSpec::Input => {
                page.add_element(parent, ElementKind::Input);
            }
        }
    }
}
