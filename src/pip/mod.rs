//! Picture-in-Picture session management.
//!
//! A frame context owns exactly one [`PipSessionManager`]. The manager picks
//! a strategy per session (document-level PiP window, native PiP, or an
//! in-page floating fallback), moves or restyles the video accordingly, and
//! restores it when the session ends for any reason.

pub mod autopip;
pub mod controls;
pub mod manager;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::PipCapabilities;
use crate::config::Dimensions;
use crate::dom::{ListenerId, MediaEventKind, NodeId};
use crate::error::PlatformError;

pub use autopip::AutoPip;
pub use controls::{ControlAction, ControlOutcome, ControlOverlay};
pub use manager::PipSessionManager;
pub use session::{OriginalPlacement, PipSession, RestoreOutcome, SessionId};

/// Auxiliary top-level window created by document-level PiP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u64);

/// Close-detection hook registered with the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HookId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentWindow {
    pub id: WindowId,
    /// Body element of the window's document
    pub body: NodeId,
}

/// Surface whose out-of-band closing must end the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseTarget {
    Window(WindowId),
    Native(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipStrategy {
    Native,
    Document,
    Floating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipState {
    Idle,
    NativeActive,
    DocumentActive,
    FloatingActive,
}

impl From<PipStrategy> for PipState {
    fn from(strategy: PipStrategy) -> Self {
        match strategy {
            PipStrategy::Native => PipState::NativeActive,
            PipStrategy::Document => PipState::DocumentActive,
            PipStrategy::Floating => PipState::FloatingActive,
        }
    }
}

impl PipState {
    pub fn is_active(self) -> bool {
        !matches!(self, PipState::Idle)
    }
}

/// Strategies an `open` is allowed to try, in fixed order document → native → floating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySet {
    pub document: bool,
    pub native: bool,
    pub floating: bool,
}

impl StrategySet {
    pub const ALL: StrategySet = StrategySet {
        document: true,
        native: true,
        floating: true,
    };

    pub const NATIVE_ONLY: StrategySet = StrategySet {
        document: false,
        native: true,
        floating: false,
    };
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Events delivered by the host into a frame context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    /// A PiP surface closed out-of-band (window closed, native PiP left)
    SurfaceClosed { hook: HookId },
    Media {
        listener: ListenerId,
        video: NodeId,
        kind: MediaEventKind,
    },
    TimeUpdate { video: NodeId, current_time: f64 },
    ControlPressed { action: ControlAction },
    CloseButtonClicked,
    VisibilityChanged { hidden: bool },
    PageUnload,
}

/// Platform PiP operations. Requests are the only suspension points of the
/// session state machine.
#[async_trait(?Send)]
pub trait PipPlatform {
    fn capabilities(&self) -> PipCapabilities;

    async fn request_document_window(&self, size: Dimensions) -> Result<DocumentWindow, PlatformError>;

    fn resize_document_window(&self, window: WindowId, size: Dimensions) -> Result<(), PlatformError>;

    fn move_document_window(&self, window: WindowId, dx: i32, dy: i32) -> Result<(), PlatformError>;

    /// Idempotent
    fn close_document_window(&self, window: WindowId);

    async fn request_native(&self, video: NodeId) -> Result<(), PlatformError>;

    async fn exit_native(&self) -> Result<(), PlatformError>;

    fn watch_close(&self, target: CloseTarget) -> HookId;

    fn unwatch_close(&self, hook: HookId);
}
