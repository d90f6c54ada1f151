use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Dimensions, PlayerSize};
use crate::dom::{NodeId, Page};
use crate::error::PlatformError;

use super::controls::ControlOverlay;
use super::{DocumentWindow, HookId, PipStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// Where a video lived before document PiP moved it
#[derive(Debug, Clone, PartialEq)]
pub struct OriginalPlacement {
    pub parent: NodeId,
    pub next_sibling: Option<NodeId>,
    /// Raw inline style, `None` when the attribute was absent
    pub style: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Original parent is gone; the video stays where it is
    Orphaned,
}

impl OriginalPlacement {
    /// Snapshot the node's position; `None` for a detached node
    pub fn capture(page: &dyn Page, node: NodeId) -> Option<Self> {
        let parent = page.parent(node)?;
        Some(Self {
            parent,
            next_sibling: page.next_sibling(node),
            style: page.style_attribute(node),
        })
    }

    /// Put the style back, then the node back under its parent
    pub fn restore(&self, page: &dyn Page, node: NodeId) -> Result<RestoreOutcome, PlatformError> {
        page.set_style_attribute(node, self.style.as_deref());

        if !page.is_connected(self.parent) {
            warn!("🧩 Original parent {:?} of {:?} is no longer attached", self.parent, node);
            return Ok(RestoreOutcome::Orphaned);
        }

        // The old sibling may have moved elsewhere since capture
        let reference = self
            .next_sibling
            .filter(|sibling| page.parent(*sibling) == Some(self.parent));
        page.insert_before(self.parent, node, reference)?;
        debug!("↩️ Restored {:?} under {:?}", node, self.parent);
        Ok(RestoreOutcome::Restored)
    }
}

/// Strategy-specific resources held by a live session
pub enum StrategyBinding {
    Native {
        hook: HookId,
    },
    Document {
        window: DocumentWindow,
        placement: OriginalPlacement,
        hook: HookId,
        controls: ControlOverlay,
        /// Current window size, moved by keyboard nudges
        window_size: Dimensions,
    },
    Floating {
        prior_style: Option<String>,
    },
}

impl StrategyBinding {
    pub fn strategy(&self) -> PipStrategy {
        match self {
            StrategyBinding::Native { .. } => PipStrategy::Native,
            StrategyBinding::Document { .. } => PipStrategy::Document,
            StrategyBinding::Floating { .. } => PipStrategy::Floating,
        }
    }

    pub fn hook(&self) -> Option<HookId> {
        match self {
            StrategyBinding::Native { hook } | StrategyBinding::Document { hook, .. } => Some(*hook),
            StrategyBinding::Floating { .. } => None,
        }
    }
}

/// One active PiP presentation of one video
pub struct PipSession {
    pub id: SessionId,
    pub video: NodeId,
    pub size: PlayerSize,
    pub binding: StrategyBinding,
}

impl PipSession {
    pub fn strategy(&self) -> PipStrategy {
        self.binding.strategy()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            video: self.video,
            strategy: self.strategy(),
            size: self.size,
        }
    }
}

/// Copyable summary of the live session, readable without the transition lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub video: NodeId,
    pub strategy: PipStrategy,
    pub size: PlayerSize,
}
