use std::cell::Cell;
use std::rc::Rc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::dom::{DomTree, MutationSource, NodeId, Page};
use crate::locator::{VideoHandle, VideoLocator, VideoWatch};
use crate::overlay::{OverlayHost, OverlayRegistry};
use crate::pip::{AutoPip, PageEvent, PipPlatform, PipSessionManager, PipState, PipStrategy, StrategySet};
use crate::router::{Command, CommandResponse, CommandRouter, KeyInput};

/// Everything one frame owns: locator, overlays, the PiP session manager,
/// the command router and auto-PiP tracking. Frames never share sessions.
pub struct FrameContext {
    frame_id: u32,
    page: Rc<dyn Page>,
    locator: VideoLocator,
    overlays: Rc<OverlayRegistry>,
    manager: Rc<PipSessionManager>,
    router: CommandRouter,
    auto_pip: AutoPip,
    /// Video overlays follow while no session is open
    last_anchor: Cell<Option<NodeId>>,
}

impl FrameContext {
    pub fn new(
        frame_id: u32,
        page: Rc<dyn Page>,
        platform: Rc<dyn PipPlatform>,
        host: Rc<dyn OverlayHost>,
        config: &Config,
    ) -> Self {
        let locator = VideoLocator::new(page.clone(), config.locator.clone());
        let overlays = Rc::new(OverlayRegistry::new(page.clone(), host, config.overlay.clone()));
        let manager = Rc::new(PipSessionManager::new(
            page.clone(),
            platform,
            overlays.clone(),
            config.player.player_size,
            config.controls.seek_step,
        ));
        let router = CommandRouter::new(
            page.clone(),
            locator.clone(),
            manager.clone(),
            overlays.clone(),
            config.player.clone(),
            config.controls.clone(),
        );
        debug!("🧱 Frame context {} ready", frame_id);

        Self {
            frame_id,
            page,
            locator,
            overlays,
            manager,
            router,
            auto_pip: AutoPip::new(config.player.auto_pip_enabled),
            last_anchor: Cell::new(None),
        }
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    pub fn locator(&self) -> &VideoLocator {
        &self.locator
    }

    pub fn overlays(&self) -> &OverlayRegistry {
        &self.overlays
    }

    pub fn manager(&self) -> &PipSessionManager {
        &self.manager
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn auto_pip(&self) -> &AutoPip {
        &self.auto_pip
    }

    pub fn state(&self) -> PipState {
        self.manager.state()
    }

    /// Commands addressed to another frame are ignored
    pub async fn handle_command(&self, command: Command) -> CommandResponse {
        if let Command::TogglePip {
            frame_id: Some(target), ..
        } = &command
        {
            if *target != self.frame_id {
                debug!("Toggle for frame {} ignored by frame {}", target, self.frame_id);
                return CommandResponse::Ignored;
            }
        }
        self.router.dispatch(command).await
    }

    pub async fn handle_key(&self, input: &KeyInput) -> bool {
        self.router.handle_key(input).await
    }

    pub async fn handle_event(&self, event: PageEvent) {
        match event {
            PageEvent::SurfaceClosed { hook } => {
                self.manager.handle_surface_closed(hook).await;
            }
            PageEvent::Media { listener, kind, .. } => {
                self.manager.handle_media_event(listener, kind).await;
            }
            PageEvent::TimeUpdate { current_time, .. } => {
                if self.router.subtitle_count() > 0 {
                    self.router.update_caption(current_time);
                }
            }
            PageEvent::ControlPressed { action } => {
                self.manager.handle_control(action).await;
            }
            PageEvent::CloseButtonClicked => {
                self.manager.close().await;
            }
            PageEvent::VisibilityChanged { hidden: true } => self.on_hidden().await,
            PageEvent::VisibilityChanged { hidden: false } => self.on_visible().await,
            PageEvent::PageUnload => {
                info!("👋 Page unloading, closing any session");
                self.manager.close().await;
            }
        }
    }

    async fn on_hidden(&self) {
        if !self.auto_pip.is_enabled() || self.router.is_blocked() {
            return;
        }
        let Some(primary) = self.locator.locate_primary() else {
            return;
        };
        if !self.auto_pip.should_open(&primary.media, self.manager.session().is_some()) {
            return;
        }

        info!("🤖 Page hidden during playback, entering PiP");
        if self.manager.open_with(&primary, StrategySet::NATIVE_ONLY).await == PipState::NativeActive {
            if let Some(session) = self.manager.session() {
                self.auto_pip.mark_opened(session.id);
            }
        }
    }

    async fn on_visible(&self) {
        let live = self.manager.session().map(|session| session.id);
        if self.auto_pip.take_for_close(live).is_some() {
            info!("🤖 Page visible again, leaving auto PiP");
            self.manager.close().await;
        }
    }

    /// Node overlays follow. Document sessions move the video out of the
    /// page, so overlays fall back to viewport placement. Without a session
    /// the located video stays the anchor while it is attached, so a
    /// collapsed box hides overlays instead of moving them.
    pub fn anchor(&self) -> Option<NodeId> {
        match self.manager.session() {
            Some(session) if session.strategy == PipStrategy::Document => None,
            Some(session) => Some(session.video),
            None => {
                let sticky = self
                    .last_anchor
                    .get()
                    .filter(|node| self.page.is_connected(*node));
                let anchor = sticky.or_else(|| self.locator.locate_primary().map(|handle| handle.node));
                self.last_anchor.set(anchor);
                anchor
            }
        }
    }

    /// One overlay poll step
    pub fn tick(&self) {
        self.overlays.reposition(self.anchor());
        self.overlays.expire_toast(Instant::now());
    }

    pub async fn run_overlay_loop(&self, shutdown: watch::Receiver<bool>) {
        self.overlays.run(|| self.anchor(), shutdown).await;
    }

    /// Report significant videos added under the document
    pub fn watch_videos(
        &self,
        source: Rc<dyn MutationSource>,
        on_video: impl FnMut(VideoHandle) + 'static,
    ) -> VideoWatch {
        self.locator.watch(source, self.page.document(), on_video)
    }
}
