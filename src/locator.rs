use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

use crate::config::LocatorConfig;
use crate::dom::{ElementKind, MediaSnapshot, MutationSource, NodeId, Page, Rect, SubscriptionId};

/// Where a located video lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "root", rename_all = "snake_case")]
pub enum SearchContext {
    Document(NodeId),
    Shadow(NodeId),
    Frame(NodeId),
}

/// A located `<video>` element plus the metadata derived during the locate pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHandle {
    pub node: NodeId,
    pub rect: Rect,
    pub media: MediaSnapshot,
    pub context: SearchContext,
    /// Index of the video within its originating document/shadow/frame context
    pub index: usize,
}

impl VideoHandle {
    pub fn area(&self) -> f64 {
        self.rect.area()
    }
}

/// Finds candidate videos across the accessible DOM tree and ranks them
#[derive(Clone)]
pub struct VideoLocator {
    page: Rc<dyn Page>,
    config: LocatorConfig,
}

impl VideoLocator {
    pub fn new(page: Rc<dyn Page>, config: LocatorConfig) -> Self {
        Self { page, config }
    }

    /// Every significant video, in traversal order. Recomputed per call.
    pub fn locate_all(&self) -> Vec<VideoHandle> {
        self.all_videos_under(self.page.document())
            .into_iter()
            .filter(|handle| self.is_significant(handle))
            .collect()
    }

    /// The single video the user most likely wants to control
    pub fn locate_primary(&self) -> Option<VideoHandle> {
        let candidates = self.locate_all();
        let primary = select_primary(&candidates).cloned();
        match &primary {
            Some(handle) => debug!(
                "🎯 Primary video {:?} ({}x{}) of {} candidates",
                handle.node,
                handle.rect.width,
                handle.rect.height,
                candidates.len()
            ),
            None => debug!("📭 No significant video on page"),
        }
        primary
    }

    /// Re-read a known node as a fresh handle, if it is still a video.
    /// Nodes moved out of the page (e.g. into a PiP window) keep index 0.
    pub fn refresh(&self, node: NodeId) -> Option<VideoHandle> {
        if let Some(found) = self
            .all_videos_under(self.page.document())
            .into_iter()
            .find(|handle| handle.node == node)
        {
            return Some(found);
        }

        if self.page.kind(node) != Some(ElementKind::Video) {
            return None;
        }
        Some(VideoHandle {
            node,
            rect: self.page.bounding_rect(node),
            media: self.page.media(node)?,
            context: SearchContext::Document(self.page.document()),
            index: 0,
        })
    }

    /// Visible, large enough and backed by playable content
    pub fn is_significant(&self, handle: &VideoHandle) -> bool {
        if handle.rect.is_empty() {
            return false;
        }

        if handle.rect.width < self.config.min_width || handle.rect.height < self.config.min_height {
            return false;
        }

        let has_content = handle.media.has_source_attr()
            || handle.media.ready_state > 0
            || self
                .page
                .children(handle.node)
                .into_iter()
                .any(|child| self.page.kind(child) == Some(ElementKind::Source));
        if !has_content {
            return false;
        }

        !self.page.visibility(handle.node).is_hidden()
    }

    /// Depth-first walk collecting all videos, significant or not
    pub fn all_videos_under(&self, root: NodeId) -> Vec<VideoHandle> {
        let mut found = Vec::new();
        let context = self.context_of(root);
        let mut counter = 0;
        self.visit(root, context, &mut counter, &mut found);
        found
    }

    /// Document, shadow tree or frame that `node` belongs to
    pub fn context_of(&self, node: NodeId) -> SearchContext {
        let mut top = node;
        while let Some(parent) = self.page.parent(top) {
            top = parent;
        }
        match self.page.host(top) {
            Some(host) if self.page.kind(host) == Some(ElementKind::Iframe) => SearchContext::Frame(top),
            Some(_) => SearchContext::Shadow(top),
            None => SearchContext::Document(top),
        }
    }

    fn visit(
        &self,
        node: NodeId,
        context: SearchContext,
        counter: &mut usize,
        found: &mut Vec<VideoHandle>,
    ) {
        match self.page.kind(node) {
            Some(ElementKind::Video) => {
                if let Some(media) = self.page.media(node) {
                    found.push(VideoHandle {
                        node,
                        rect: self.page.bounding_rect(node),
                        media,
                        context,
                        index: *counter,
                    });
                    *counter += 1;
                }
            }
            Some(ElementKind::Iframe) => match self.page.frame_document(node) {
                Ok(Some(frame_root)) => {
                    let mut frame_counter = 0;
                    self.visit(frame_root, SearchContext::Frame(frame_root), &mut frame_counter, found);
                }
                Ok(None) => {}
                Err(e) => debug!("🔒 Skipping inaccessible frame {:?}: {}", node, e),
            },
            _ => {}
        }

        if let Some(shadow_root) = self.page.shadow_root(node) {
            let mut shadow_counter = 0;
            self.visit(shadow_root, SearchContext::Shadow(shadow_root), &mut shadow_counter, found);
        }

        for child in self.page.children(node) {
            self.visit(child, context, counter, found);
        }
    }

    /// Report significant videos appearing under `root`, once per element.
    /// Dropping the returned watch ends the subscription.
    pub fn watch(
        &self,
        source: Rc<dyn MutationSource>,
        root: NodeId,
        on_video: impl FnMut(VideoHandle) + 'static,
    ) -> VideoWatch {
        let locator = self.clone();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut on_video = on_video;

        let subscription = source.subscribe(
            root,
            Box::new(move |added: NodeId| {
                for handle in locator.all_videos_under(added) {
                    if !locator.is_significant(&handle) {
                        continue;
                    }
                    if seen.insert(handle.node) {
                        debug!("🆕 New significant video {:?}", handle.node);
                        on_video(handle);
                    }
                }
            }),
        );

        VideoWatch {
            source,
            subscription: Some(subscription),
        }
    }
}

/// Tie-break order: playing+audible, then playing, then largest area.
/// Ties at every stage go to the first candidate in traversal order.
pub fn select_primary(candidates: &[VideoHandle]) -> Option<&VideoHandle> {
    if let Some(audible) = candidates
        .iter()
        .find(|v| !v.media.paused && !v.media.muted && v.media.current_time > 0.0)
    {
        return Some(audible);
    }

    if let Some(playing) = candidates.iter().find(|v| v.media.is_playing()) {
        return Some(playing);
    }

    candidates.iter().fold(None, |largest: Option<&VideoHandle>, current| match largest {
        Some(best) if current.area() <= best.area() => Some(best),
        _ => Some(current),
    })
}

/// Live node-added subscription; unsubscribes on drop
pub struct VideoWatch {
    source: Rc<dyn MutationSource>,
    subscription: Option<SubscriptionId>,
}

impl VideoWatch {
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.source.unsubscribe(subscription);
        }
    }
}

impl Drop for VideoWatch {
    fn drop(&mut self) {
        if self.subscription.is_some() {
            debug!("Video watch dropped, unsubscribing");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(node: u64, width: f64, height: f64, media: MediaSnapshot) -> VideoHandle {
        VideoHandle {
            node: NodeId(node),
            rect: Rect::new(0.0, 0.0, width, height),
            media,
            context: SearchContext::Document(NodeId(0)),
            index: node as usize,
        }
    }

    fn playing(muted: bool) -> MediaSnapshot {
        MediaSnapshot {
            paused: false,
            muted,
            current_time: 12.0,
            ..MediaSnapshot::default()
        }
    }

    #[test]
    fn test_playing_unmuted_wins_in_any_order() {
        let paused = MediaSnapshot::default();
        let orders = [
            vec![handle(1, 800.0, 450.0, paused.clone()), handle(2, 640.0, 360.0, playing(false)), handle(3, 900.0, 500.0, paused.clone())],
            vec![handle(2, 640.0, 360.0, playing(false)), handle(1, 800.0, 450.0, paused.clone()), handle(3, 900.0, 500.0, paused.clone())],
            vec![handle(1, 800.0, 450.0, paused.clone()), handle(3, 900.0, 500.0, paused.clone()), handle(2, 640.0, 360.0, playing(false))],
        ];

        for candidates in &orders {
            assert_eq!(select_primary(candidates).unwrap().node, NodeId(2));
        }
    }

    #[test]
    fn test_audible_beats_muted_playing() {
        let candidates = vec![handle(1, 640.0, 360.0, playing(true)), handle(2, 300.0, 200.0, playing(false))];
        assert_eq!(select_primary(&candidates).unwrap().node, NodeId(2));
    }

    #[test]
    fn test_muted_playing_beats_larger_paused() {
        let candidates = vec![handle(1, 1280.0, 720.0, MediaSnapshot::default()), handle(2, 300.0, 200.0, playing(true))];
        assert_eq!(select_primary(&candidates).unwrap().node, NodeId(2));
    }

    #[test]
    fn test_largest_area_with_first_on_tie() {
        let paused = MediaSnapshot::default();
        let candidates = vec![
            handle(1, 640.0, 360.0, paused.clone()),
            handle(2, 800.0, 450.0, paused.clone()),
            handle(3, 800.0, 450.0, paused),
        ];
        assert_eq!(select_primary(&candidates).unwrap().node, NodeId(2));
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_primary(&[]).is_none());
    }
}
