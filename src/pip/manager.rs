use std::cell::Cell;
use std::rc::Rc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::config::{Dimensions, PlayerSize};
use crate::dom::{ListenerId, MediaEventKind, NodeId, Page};
use crate::error::{PipError, PlatformError, Result};
use crate::locator::VideoHandle;
use crate::overlay::{OverlayRegistry, Severity};

use super::controls::{ControlAction, ControlOutcome, ControlOverlay};
use super::session::{OriginalPlacement, PipSession, RestoreOutcome, SessionId, SessionInfo, StrategyBinding};
use super::{CloseTarget, HookId, PipPlatform, PipState, PipStrategy, StrategySet};

/// Smallest document window a keyboard resize may produce
const MIN_WINDOW: Dimensions = Dimensions { width: 200, height: 113 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Requested,
    /// The platform already tore the surface down
    SurfaceClosed,
}

/// Owns at most one PiP session per frame context.
///
/// Every transition (open, close, toggle, resize, surface-closed) runs under a
/// single async lock held across platform requests. Transitions therefore
/// apply in arrival order and a close issued while an open is pending takes
/// effect once the open has settled.
pub struct PipSessionManager {
    page: Rc<dyn Page>,
    platform: Rc<dyn PipPlatform>,
    overlays: Rc<OverlayRegistry>,
    seek_step: f64,
    slot: Mutex<Option<PipSession>>,
    info: Cell<Option<SessionInfo>>,
    state_tx: watch::Sender<PipState>,
    size: Cell<PlayerSize>,
    next_id: Cell<u64>,
}

impl PipSessionManager {
    pub fn new(
        page: Rc<dyn Page>,
        platform: Rc<dyn PipPlatform>,
        overlays: Rc<OverlayRegistry>,
        size: PlayerSize,
        seek_step: f64,
    ) -> Self {
        let (state_tx, _) = watch::channel(PipState::Idle);
        Self {
            page,
            platform,
            overlays,
            seek_step,
            slot: Mutex::new(None),
            info: Cell::new(None),
            state_tx,
            size: Cell::new(size),
            next_id: Cell::new(1),
        }
    }

    pub fn state(&self) -> PipState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipState> {
        self.state_tx.subscribe()
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.info.get()
    }

    pub fn bound_video(&self) -> Option<NodeId> {
        self.info.get().map(|info| info.video)
    }

    pub fn size_preference(&self) -> PlayerSize {
        self.size.get()
    }

    /// Whether a transition is currently in flight
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Open with the full strategy chain
    pub async fn open(&self, video: &VideoHandle) -> PipState {
        self.open_with(video, StrategySet::ALL).await
    }

    /// Open a session for `video`, ending any existing one first. Strategies
    /// are tried document → native → floating, restricted to `strategies`.
    pub async fn open_with(&self, video: &VideoHandle, strategies: StrategySet) -> PipState {
        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.take() {
            debug!("🔄 Replacing session {:?}", existing.id);
            self.teardown(existing, CloseReason::Requested).await;
        }
        self.open_locked(&mut slot, video, strategies).await
    }

    /// End the active session. Idempotent; returns whether one was active.
    pub async fn close(&self) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.take() {
            Some(session) => {
                self.teardown(session, CloseReason::Requested).await;
                self.overlays.toast("PiP Mode Closed", Severity::Info);
                true
            }
            None => {
                debug!("Close requested with no active session");
                false
            }
        }
    }

    /// Close when active, otherwise open `target`. Decided under the lock so
    /// queued toggles observe each other's results.
    pub async fn toggle(&self, target: Option<&VideoHandle>) -> Result<PipState> {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.take() {
            self.teardown(session, CloseReason::Requested).await;
            self.overlays.toast("PiP Mode Closed", Severity::Info);
            return Ok(PipState::Idle);
        }

        match target {
            Some(video) => Ok(self.open_locked(&mut slot, video, StrategySet::ALL).await),
            None => Err(PipError::NoVideo),
        }
    }

    /// Apply a size preference. The preference is kept for later sessions
    /// even when nothing is open; returns whether a live surface was resized.
    pub async fn resize(&self, size: PlayerSize) -> bool {
        self.size.set(size);
        let mut slot = self.slot.lock().await;
        let Some(session) = slot.as_mut() else {
            debug!("📐 Size preference set to {} (no active session)", size.as_str());
            return false;
        };

        let dims = size.dimensions();
        session.size = size;
        match &mut session.binding {
            StrategyBinding::Document { window, window_size, .. } => {
                if let Err(e) = self.platform.resize_document_window(window.id, dims) {
                    warn!("📐 Document window resize failed: {}", e);
                } else {
                    *window_size = dims;
                }
            }
            StrategyBinding::Floating { .. } => {
                self.apply_floating_size(session.video, dims);
                self.overlays.show_close_button(dims);
            }
            StrategyBinding::Native { .. } => {
                debug!("📐 Native PiP size is platform-controlled");
            }
        }
        self.publish(Some(session.info()));
        info!("📐 Player resized to {} ({}x{})", size.as_str(), dims.width, dims.height);
        true
    }

    /// Grow or shrink the document window by `delta` pixels on both axes
    pub async fn resize_window_by(&self, delta: i32) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(StrategyBinding::Document { window, window_size, .. }) = slot.as_mut().map(|s| &mut s.binding) else {
            return false;
        };

        let next = Dimensions {
            width: (window_size.width as i64 + delta as i64).max(MIN_WINDOW.width as i64) as u32,
            height: (window_size.height as i64 + delta as i64).max(MIN_WINDOW.height as i64) as u32,
        };
        match self.platform.resize_document_window(window.id, next) {
            Ok(()) => {
                *window_size = next;
                true
            }
            Err(e) => {
                warn!("📐 Document window resize failed: {}", e);
                false
            }
        }
    }

    /// Move the document window by an offset
    pub async fn move_window(&self, dx: i32, dy: i32) -> bool {
        let slot = self.slot.lock().await;
        let Some(StrategyBinding::Document { window, .. }) = slot.as_ref().map(|s| &s.binding) else {
            return false;
        };
        match self.platform.move_document_window(window.id, dx, dy) {
            Ok(()) => true,
            Err(e) => {
                warn!("🪟 Document window move failed: {}", e);
                false
            }
        }
    }

    /// A surface closed out-of-band. Stale hooks are ignored.
    pub async fn handle_surface_closed(&self, hook: HookId) -> bool {
        let mut slot = self.slot.lock().await;
        let matches = slot
            .as_ref()
            .is_some_and(|session| session.binding.hook() == Some(hook));
        if !matches {
            debug!("Ignoring close from stale hook {:?}", hook);
            return false;
        }

        if let Some(session) = slot.take() {
            info!("🪟 PiP surface closed by platform");
            self.teardown(session, CloseReason::SurfaceClosed).await;
            self.overlays.toast("PiP Mode Closed", Severity::Info);
        }
        true
    }

    /// Forward a play/pause event to the document controls, if bound to `listener`
    pub async fn handle_media_event(&self, listener: ListenerId, kind: MediaEventKind) {
        let mut slot = self.slot.lock().await;
        if let Some(StrategyBinding::Document { controls, .. }) = slot.as_mut().map(|s| &mut s.binding) {
            if controls.listener() == listener {
                controls.sync(&self.overlays, kind);
            }
        }
    }

    /// Run a control-bar action. Only document sessions carry controls.
    pub async fn handle_control(&self, action: ControlAction) -> Option<ControlOutcome> {
        let mut slot = self.slot.lock().await;
        let Some(StrategyBinding::Document { controls, .. }) = slot.as_mut().map(|s| &mut s.binding) else {
            debug!("Control {:?} ignored without document session", action);
            return None;
        };

        let outcome = controls.apply(&*self.page, &self.overlays, action, self.seek_step);
        match &outcome {
            ControlOutcome::Speed(rate) => self.overlays.toast(&format!("Speed: {}x ⚡", rate), Severity::Info),
            ControlOutcome::Snapshot(_) => self.overlays.toast("Snapshot saved 📸", Severity::Success),
            ControlOutcome::SnapshotBlocked(_) => {
                self.overlays.toast("Snapshot blocked (protected video) 🔒", Severity::Error)
            }
            _ => {}
        }
        Some(outcome)
    }

    async fn open_locked(
        &self,
        slot: &mut Option<PipSession>,
        video: &VideoHandle,
        strategies: StrategySet,
    ) -> PipState {
        let size = self.size.get();
        let Some(binding) = self.acquire(video, size, strategies).await else {
            warn!("❌ No PiP strategy succeeded for {:?}", video.node);
            self.overlays.toast("Picture-in-Picture unavailable", Severity::Error);
            self.publish(None);
            return PipState::Idle;
        };

        let id = SessionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let session = PipSession {
            id,
            video: video.node,
            size,
            binding,
        };

        let (message, severity) = match session.strategy() {
            PipStrategy::Document => ("PiP Window Opened 🪟", Severity::Success),
            PipStrategy::Native => ("PiP Mode Enabled 📺", Severity::Success),
            PipStrategy::Floating => ("Floating Mode (Fallback) 🎈", Severity::Warning),
        };
        info!("📺 Session {:?} opened with {:?} for {:?}", id, session.strategy(), video.node);
        self.overlays.toast(message, severity);

        let info = session.info();
        *slot = Some(session);
        self.publish(Some(info));
        info.strategy.into()
    }

    async fn acquire(&self, video: &VideoHandle, size: PlayerSize, strategies: StrategySet) -> Option<StrategyBinding> {
        let caps = self.platform.capabilities();

        if strategies.document {
            match caps.document_pip {
                Capability::Available => match self.enter_document(video, size).await {
                    Ok(binding) => return Some(binding),
                    Err(e) => warn!("🪟 Document PiP failed, falling back: {}", e),
                },
                other => debug!("Document PiP {:?}, skipping", other),
            }
        }

        if strategies.native {
            match caps.native_pip {
                Capability::Available => match self.enter_native(video).await {
                    Ok(binding) => return Some(binding),
                    Err(e) => warn!("📺 Native PiP failed, falling back: {}", e),
                },
                other => debug!("Native PiP {:?}, skipping", other),
            }
        }

        if strategies.floating {
            return Some(self.enter_floating(video, size));
        }
        None
    }

    async fn enter_document(&self, video: &VideoHandle, size: PlayerSize) -> std::result::Result<StrategyBinding, PlatformError> {
        let dims = size.dimensions();
        let window = self.platform.request_document_window(dims).await?;

        let Some(placement) = OriginalPlacement::capture(&*self.page, video.node) else {
            self.platform.close_document_window(window.id);
            return Err(PlatformError::NotAttached);
        };

        apply_document_styles(&*self.page, video.node);
        if let Err(e) = self.page.insert_before(window.body, video.node, None) {
            // Unwind: nothing was moved, only restyled
            self.page.set_style_attribute(video.node, placement.style.as_deref());
            self.platform.close_document_window(window.id);
            return Err(e);
        }

        let controls = ControlOverlay::bind(&*self.page, &self.overlays, video.node, window.id);
        let hook = self.platform.watch_close(CloseTarget::Window(window.id));
        debug!("🪟 Video {:?} moved into window {:?}", video.node, window.id);

        Ok(StrategyBinding::Document {
            window,
            placement,
            hook,
            controls,
            window_size: dims,
        })
    }

    async fn enter_native(&self, video: &VideoHandle) -> std::result::Result<StrategyBinding, PlatformError> {
        self.platform.request_native(video.node).await?;
        let hook = self.platform.watch_close(CloseTarget::Native(video.node));
        Ok(StrategyBinding::Native { hook })
    }

    fn enter_floating(&self, video: &VideoHandle, size: PlayerSize) -> StrategyBinding {
        let prior_style = self.page.style_attribute(video.node);
        let dims = size.dimensions();
        let page = &*self.page;
        page.set_style_property(video.node, "position", "fixed", true);
        page.set_style_property(video.node, "bottom", "20px", true);
        page.set_style_property(video.node, "right", "20px", true);
        page.set_style_property(video.node, "z-index", "2147483647", true);
        page.set_style_property(video.node, "box-shadow", "0 10px 30px rgba(0,0,0,0.5)", true);
        page.set_style_property(video.node, "border-radius", "12px", true);
        page.set_style_property(video.node, "object-fit", "cover", true);
        self.apply_floating_size(video.node, dims);
        self.overlays.show_close_button(dims);
        StrategyBinding::Floating { prior_style }
    }

    fn apply_floating_size(&self, video: NodeId, dims: Dimensions) {
        self.page
            .set_style_property(video, "width", &format!("{}px", dims.width), true);
        self.page
            .set_style_property(video, "height", &format!("{}px", dims.height), true);
    }

    /// Release every resource of `session` and restore the video
    async fn teardown(&self, session: PipSession, reason: CloseReason) {
        let PipSession { id, video, binding, .. } = session;
        match binding {
            StrategyBinding::Document {
                window,
                placement,
                hook,
                controls,
                ..
            } => {
                self.platform.unwatch_close(hook);
                controls.unbind(&*self.page, &self.overlays);
                match placement.restore(&*self.page, video) {
                    Ok(RestoreOutcome::Restored) => {}
                    Ok(RestoreOutcome::Orphaned) => warn!("🧩 Video {:?} orphaned in PiP window", video),
                    Err(e) => warn!("🧩 Failed to restore {:?}: {}", video, e),
                }
                self.platform.close_document_window(window.id);
            }
            StrategyBinding::Native { hook } => {
                self.platform.unwatch_close(hook);
                if reason == CloseReason::Requested {
                    if let Err(e) = self.platform.exit_native().await {
                        warn!("📺 Exiting native PiP failed: {}", e);
                    }
                }
            }
            StrategyBinding::Floating { prior_style } => {
                self.overlays.remove_close_button();
                self.page.set_style_attribute(video, prior_style.as_deref());
            }
        }
        self.publish(None);
        info!("🛑 Session {:?} closed ({:?})", id, reason);
    }

    fn publish(&self, info: Option<SessionInfo>) {
        self.info.set(info);
        let state = info.map_or(PipState::Idle, |info| info.strategy.into());
        self.state_tx.send_replace(state);
    }
}

fn apply_document_styles(page: &dyn Page, video: NodeId) {
    page.set_style_property(video, "width", "100%", true);
    page.set_style_property(video, "height", "100%", true);
    page.set_style_property(video, "max-width", "none", true);
    page.set_style_property(video, "max-height", "none", true);
    page.set_style_property(video, "object-fit", "contain", true);
    page.set_style_property(video, "position", "static", true);
}
