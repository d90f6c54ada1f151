use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

use crate::capability::PipCapabilities;
use crate::config::Dimensions;
use crate::dom::NodeId;
use crate::error::PlatformError;
use crate::pip::{CloseTarget, DocumentWindow, HookId, PageEvent, PipPlatform, PipStrategy, WindowId};

use super::page::SimPage;

#[derive(Debug, Clone, PartialEq)]
pub struct SimWindow {
    pub body: NodeId,
    pub size: Dimensions,
    pub position: (i32, i32),
    pub open: bool,
}

#[derive(Default)]
struct PlatformState {
    capabilities: PipCapabilities,
    latency: Duration,
    document_error: Option<PlatformError>,
    native_error: Option<PlatformError>,
    resize_error: Option<PlatformError>,
    windows: BTreeMap<WindowId, SimWindow>,
    native: Option<NodeId>,
    hooks: BTreeMap<HookId, CloseTarget>,
    next_id: u64,
    attempts: Vec<PipStrategy>,
    events: Vec<PageEvent>,
    peak_surfaces: usize,
}

impl PlatformState {
    fn open_surfaces(&self) -> usize {
        self.windows.values().filter(|w| w.open).count() + usize::from(self.native.is_some())
    }

    fn record_peak(&mut self) {
        self.peak_surfaces = self.peak_surfaces.max(self.open_surfaces());
    }

    /// Queue close events for hooks watching `target`
    fn fire_close(&mut self, target: CloseTarget) {
        let hooks: Vec<HookId> = self
            .hooks
            .iter()
            .filter(|(_, watched)| **watched == target)
            .map(|(hook, _)| *hook)
            .collect();
        for hook in hooks {
            self.events.push(PageEvent::SurfaceClosed { hook });
        }
    }
}

/// Scriptable PiP platform: capability flags, injectable failures, request
/// latency, and user-initiated closes that surface as queued events.
pub struct SimPlatform {
    page: Rc<SimPage>,
    state: RefCell<PlatformState>,
}

impl SimPlatform {
    pub fn new(page: Rc<SimPage>, capabilities: PipCapabilities) -> Self {
        Self {
            page,
            state: RefCell::new(PlatformState {
                capabilities,
                ..PlatformState::default()
            }),
        }
    }

    pub fn set_capabilities(&self, capabilities: PipCapabilities) {
        self.state.borrow_mut().capabilities = capabilities;
    }

    /// Delay every surface request by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.borrow_mut().latency = latency;
    }

    pub fn fail_document(&self, error: Option<PlatformError>) {
        self.state.borrow_mut().document_error = error;
    }

    pub fn fail_native(&self, error: Option<PlatformError>) {
        self.state.borrow_mut().native_error = error;
    }

    pub fn fail_resize(&self, error: Option<PlatformError>) {
        self.state.borrow_mut().resize_error = error;
    }

    /// Strategies requested so far, in order
    pub fn attempts(&self) -> Vec<PipStrategy> {
        self.state.borrow().attempts.clone()
    }

    pub fn windows(&self) -> Vec<(WindowId, SimWindow)> {
        self.state
            .borrow()
            .windows
            .iter()
            .map(|(id, window)| (*id, window.clone()))
            .collect()
    }

    pub fn open_window(&self) -> Option<(WindowId, SimWindow)> {
        self.windows().into_iter().find(|(_, window)| window.open)
    }

    pub fn native_video(&self) -> Option<NodeId> {
        self.state.borrow().native
    }

    pub fn open_surfaces(&self) -> usize {
        self.state.borrow().open_surfaces()
    }

    /// Highest number of simultaneously open surfaces seen
    pub fn peak_surfaces(&self) -> usize {
        self.state.borrow().peak_surfaces
    }

    pub fn watched_hooks(&self) -> usize {
        self.state.borrow().hooks.len()
    }

    /// The user closes the document window directly
    pub fn user_close_window(&self, window: WindowId) {
        let body = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.windows.get_mut(&window) else {
                return;
            };
            if !entry.open {
                return;
            }
            entry.open = false;
            let body = entry.body;
            state.fire_close(CloseTarget::Window(window));
            body
        };
        self.page.retire_root(body);
    }

    /// The user leaves native PiP from the OS surface
    pub fn user_exit_native(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(video) = state.native.take() {
            state.fire_close(CloseTarget::Native(video));
        }
    }

    /// Drain queued surface-closed events
    pub fn take_events(&self) -> Vec<PageEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    async fn delay(&self) {
        let latency = self.state.borrow().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait(?Send)]
impl PipPlatform for SimPlatform {
    fn capabilities(&self) -> PipCapabilities {
        self.state.borrow().capabilities
    }

    async fn request_document_window(&self, size: Dimensions) -> Result<DocumentWindow, PlatformError> {
        self.state.borrow_mut().attempts.push(PipStrategy::Document);
        self.delay().await;

        if let Some(error) = self.state.borrow().document_error.clone() {
            return Err(error);
        }

        let body = self.page.create_window_root();
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = WindowId(state.next_id);
        state.windows.insert(
            id,
            SimWindow {
                body,
                size,
                position: (0, 0),
                open: true,
            },
        );
        state.record_peak();
        debug!("🪟 Sim window {:?} opened at {}x{}", id, size.width, size.height);
        Ok(DocumentWindow { id, body })
    }

    fn resize_document_window(&self, window: WindowId, size: Dimensions) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.resize_error.clone() {
            return Err(error);
        }
        match state.windows.get_mut(&window) {
            Some(entry) if entry.open => {
                entry.size = size;
                Ok(())
            }
            _ => Err(PlatformError::Failed("window closed".to_string())),
        }
    }

    fn move_document_window(&self, window: WindowId, dx: i32, dy: i32) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        match state.windows.get_mut(&window) {
            Some(entry) if entry.open => {
                entry.position = (entry.position.0 + dx, entry.position.1 + dy);
                Ok(())
            }
            _ => Err(PlatformError::Failed("window closed".to_string())),
        }
    }

    fn close_document_window(&self, window: WindowId) {
        let body = {
            let mut state = self.state.borrow_mut();
            match state.windows.get_mut(&window) {
                Some(entry) if entry.open => {
                    entry.open = false;
                    let body = entry.body;
                    state.fire_close(CloseTarget::Window(window));
                    Some(body)
                }
                _ => None,
            }
        };
        if let Some(body) = body {
            self.page.retire_root(body);
        }
    }

    async fn request_native(&self, video: NodeId) -> Result<(), PlatformError> {
        self.state.borrow_mut().attempts.push(PipStrategy::Native);
        self.delay().await;

        let mut state = self.state.borrow_mut();
        if let Some(error) = state.native_error.clone() {
            return Err(error);
        }
        if let Some(previous) = state.native.replace(video) {
            if previous != video {
                state.fire_close(CloseTarget::Native(previous));
            }
        }
        state.record_peak();
        Ok(())
    }

    async fn exit_native(&self) -> Result<(), PlatformError> {
        self.delay().await;
        let mut state = self.state.borrow_mut();
        match state.native.take() {
            Some(video) => {
                state.fire_close(CloseTarget::Native(video));
                Ok(())
            }
            None => Err(PlatformError::Failed("not in picture-in-picture".to_string())),
        }
    }

    fn watch_close(&self, target: CloseTarget) -> HookId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let hook = HookId(state.next_id);
        state.hooks.insert(hook, target);
        hook
    }

    fn unwatch_close(&self, hook: HookId) {
        self.state.borrow_mut().hooks.remove(&hook);
    }
}
