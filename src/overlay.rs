use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{Dimensions, OverlayConfig};
use crate::dom::{NodeId, Page, Rect};
use crate::pip::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Accent colour for the toast border
    pub fn color(self) -> &'static str {
        match self {
            Severity::Success => "#10b981",
            Severity::Error => "#ef4444",
            Severity::Warning => "#f59e0b",
            Severity::Info => "#6366f1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Toast,
    Help,
    Caption,
    CloseButton,
    Controls,
}

/// Where an overlay view is drawn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OverlayPlacement {
    Hidden,
    /// Horizontally centred on `left`, `bottom` pixels above the viewport bottom
    Anchored { left: f64, bottom: f64, width: Option<f64> },
    /// Fixed offsets from the bottom-right viewport corner
    Fixed { right: f64, bottom: f64 },
    /// Rendered inside an auxiliary PiP window
    InWindow { window: WindowId },
}

impl OverlayPlacement {
    pub fn is_visible(&self) -> bool {
        !matches!(self, OverlayPlacement::Hidden)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayView {
    pub kind: OverlayKind,
    pub text: String,
    pub severity: Option<Severity>,
    pub placement: OverlayPlacement,
}

/// Renders overlay views; implemented by the page host
pub trait OverlayHost {
    fn mount(&self, view: &OverlayView) -> OverlayId;

    fn update(&self, id: OverlayId, view: &OverlayView);

    fn unmount(&self, id: OverlayId);
}

pub const HELP_TEXT: &str = "⌨️ Keyboard Shortcuts\n\
Toggle PiP: Alt + P\n\
Close PiP: Alt + X\n\
Play/Pause: Space\n\
Mute/Unmute: M\n\
Seek 5s: ← / →\n\
Volume ±: Alt + ↑/↓\n\
Speed ±: Shift + < / >\n\
Resize PiP: Alt + ±\n\
Move PiP: Alt + Arrows\n\
Help: H\n\
Press 'H' to dismiss";

struct ToastSlot {
    id: OverlayId,
    view: OverlayView,
    hide_at: Instant,
    expired: bool,
}

struct Slot {
    id: OverlayId,
    view: OverlayView,
}

#[derive(Default)]
struct RegistryState {
    toast: Option<ToastSlot>,
    help: Option<Slot>,
    caption: Option<Slot>,
    close_button: Option<Slot>,
    /// `None` = no anchor video; `Some(empty)` = collapsed anchor
    anchor: Option<Rect>,
}

/// Transient UI anchored to the primary video's screen rectangle
pub struct OverlayRegistry {
    page: Rc<dyn Page>,
    host: Rc<dyn OverlayHost>,
    config: OverlayConfig,
    state: RefCell<RegistryState>,
}

impl OverlayRegistry {
    pub fn new(page: Rc<dyn Page>, host: Rc<dyn OverlayHost>, config: OverlayConfig) -> Self {
        Self {
            page,
            host,
            config,
            state: RefCell::new(RegistryState::default()),
        }
    }

    /// Show a toast with the default duration
    pub fn toast(&self, message: &str, severity: Severity) {
        self.show(message, severity, self.config.toast_duration());
    }

    /// Replace the current toast and restart its hide timer
    pub fn show(&self, message: &str, severity: Severity, duration: Duration) {
        let mut state = self.state.borrow_mut();
        let placement = toast_placement(state.anchor, self.page.viewport());
        let view = OverlayView {
            kind: OverlayKind::Toast,
            text: message.to_string(),
            severity: Some(severity),
            placement,
        };
        let hide_at = Instant::now() + duration;

        match state.toast.as_mut() {
            Some(slot) => {
                self.host.update(slot.id, &view);
                slot.view = view;
                slot.hide_at = hide_at;
                slot.expired = false;
            }
            None => {
                let id = self.host.mount(&view);
                state.toast = Some(ToastSlot {
                    id,
                    view,
                    hide_at,
                    expired: false,
                });
            }
        }
        debug!("💬 Toast: {}", message);
    }

    /// Message currently on screen, if any
    pub fn current_toast(&self) -> Option<String> {
        let state = self.state.borrow();
        state
            .toast
            .as_ref()
            .filter(|slot| !slot.expired && slot.view.placement.is_visible())
            .map(|slot| slot.view.text.clone())
    }

    /// Pending auto-hide deadline
    pub fn toast_deadline(&self) -> Option<Instant> {
        let state = self.state.borrow();
        state
            .toast
            .as_ref()
            .filter(|slot| !slot.expired)
            .map(|slot| slot.hide_at)
    }

    /// Hide the toast when its latest deadline has passed
    pub fn expire_toast(&self, now: Instant) {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.toast.as_mut() {
            if !slot.expired && now >= slot.hide_at {
                slot.expired = true;
                slot.view.placement = OverlayPlacement::Hidden;
                self.host.update(slot.id, &slot.view);
            }
        }
    }

    /// Toggle the help panel; returns whether it is now shown
    pub fn toggle_help(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.help.take() {
            self.host.unmount(slot.id);
            return false;
        }

        let view = OverlayView {
            kind: OverlayKind::Help,
            text: HELP_TEXT.to_string(),
            severity: None,
            placement: help_placement(state.anchor, self.page.viewport()),
        };
        let id = self.host.mount(&view);
        state.help = Some(Slot { id, view });
        true
    }

    pub fn help_visible(&self) -> bool {
        self.state.borrow().help.is_some()
    }

    /// Set or clear the subtitle caption line
    pub fn set_caption(&self, text: Option<&str>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let Some(text) = text else {
            if let Some(slot) = state.caption.take() {
                self.host.unmount(slot.id);
            }
            return;
        };

        let placement = caption_placement(state.anchor, self.page.viewport());
        match state.caption.as_mut() {
            Some(slot) => {
                if slot.view.text != text {
                    slot.view.text = text.to_string();
                    slot.view.placement = placement;
                    self.host.update(slot.id, &slot.view);
                }
            }
            None => {
                let view = OverlayView {
                    kind: OverlayKind::Caption,
                    text: text.to_string(),
                    severity: None,
                    placement,
                };
                let id = self.host.mount(&view);
                state.caption = Some(Slot { id, view });
            }
        }
    }

    /// Close affordance for the floating fallback, placed just above the
    /// top-right corner of a bottom-right anchored player of `size`.
    pub fn show_close_button(&self, size: Dimensions) -> OverlayId {
        let mut state = self.state.borrow_mut();
        let view = OverlayView {
            kind: OverlayKind::CloseButton,
            text: "×".to_string(),
            severity: None,
            placement: close_button_placement(size),
        };
        if let Some(slot) = state.close_button.as_mut() {
            self.host.update(slot.id, &view);
            slot.view = view;
            return slot.id;
        }
        let id = self.host.mount(&view);
        state.close_button = Some(Slot { id, view });
        id
    }

    pub fn remove_close_button(&self) {
        if let Some(slot) = self.state.borrow_mut().close_button.take() {
            self.host.unmount(slot.id);
        }
    }

    pub fn close_button(&self) -> Option<OverlayId> {
        self.state.borrow().close_button.as_ref().map(|slot| slot.id)
    }

    /// Mount a session-owned view (e.g. PiP transport controls)
    pub fn mount(&self, view: &OverlayView) -> OverlayId {
        self.host.mount(view)
    }

    pub fn update(&self, id: OverlayId, view: &OverlayView) {
        self.host.update(id, view);
    }

    pub fn unmount(&self, id: OverlayId) {
        self.host.unmount(id);
    }

    /// Recompute the anchor rectangle and move anchored overlays with it.
    /// A collapsed anchor hides overlays without destroying them.
    pub fn reposition(&self, anchor: Option<NodeId>) {
        let viewport = self.page.viewport();
        let rect = anchor.map(|node| self.page.bounding_rect(node));
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.anchor == rect {
            return;
        }
        state.anchor = rect;

        if let Some(slot) = state.toast.as_mut() {
            if !slot.expired {
                slot.view.placement = toast_placement(rect, viewport);
                self.host.update(slot.id, &slot.view);
            }
        }
        if let Some(slot) = state.help.as_mut() {
            slot.view.placement = help_placement(rect, viewport);
            self.host.update(slot.id, &slot.view);
        }
        if let Some(slot) = state.caption.as_mut() {
            slot.view.placement = caption_placement(rect, viewport);
            self.host.update(slot.id, &slot.view);
        }
    }

    /// Poll the anchor every interval and expire toasts on time, until
    /// `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, anchor: impl Fn() -> Option<NodeId>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!("🔁 Overlay polling every {:?}", self.config.poll_interval());

        loop {
            let deadline = self.toast_deadline();
            tokio::select! {
                _ = interval.tick() => self.reposition(anchor()),
                _ = sleep_until_opt(deadline), if deadline.is_some() => self.expire_toast(Instant::now()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("🛑 Overlay polling stopped");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

fn toast_placement(anchor: Option<Rect>, viewport: Rect) -> OverlayPlacement {
    match anchor {
        None => OverlayPlacement::Anchored {
            left: viewport.center_x(),
            bottom: 30.0,
            width: None,
        },
        Some(rect) if rect.is_empty() => OverlayPlacement::Hidden,
        Some(rect) => OverlayPlacement::Anchored {
            left: rect.center_x(),
            bottom: (viewport.height - rect.bottom() + 30.0).max(30.0),
            width: None,
        },
    }
}

fn help_placement(anchor: Option<Rect>, viewport: Rect) -> OverlayPlacement {
    match anchor {
        None => OverlayPlacement::Anchored {
            left: viewport.center_x(),
            bottom: viewport.height / 2.0,
            width: None,
        },
        Some(rect) if rect.is_empty() => OverlayPlacement::Hidden,
        Some(rect) => OverlayPlacement::Anchored {
            left: rect.center_x(),
            bottom: viewport.height - rect.bottom() + rect.height / 2.0,
            width: None,
        },
    }
}

fn caption_placement(anchor: Option<Rect>, viewport: Rect) -> OverlayPlacement {
    match anchor {
        Some(rect) if !rect.is_empty() => OverlayPlacement::Anchored {
            left: rect.center_x(),
            bottom: (viewport.height - rect.bottom() + rect.height * 0.1).max(20.0),
            width: Some(rect.width * 0.8),
        },
        _ => OverlayPlacement::Hidden,
    }
}

fn close_button_placement(size: Dimensions) -> OverlayPlacement {
    OverlayPlacement::Fixed {
        right: 25.0,
        bottom: 20.0 + size.height as f64 - 12.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_follows_video() {
        let viewport = Rect::new(0.0, 0.0, 1280.0, 800.0);
        let video = Rect::new(100.0, 100.0, 640.0, 360.0);
        match caption_placement(Some(video), viewport) {
            OverlayPlacement::Anchored { left, bottom, width } => {
                assert_eq!(left, 420.0);
                assert_eq!(bottom, 800.0 - 460.0 + 36.0);
                assert_eq!(width, Some(512.0));
            }
            other => panic!("unexpected placement {:?}", other),
        }
    }

    #[test]
    fn test_collapsed_anchor_hides() {
        let viewport = Rect::new(0.0, 0.0, 1280.0, 800.0);
        let collapsed = Some(Rect::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(toast_placement(collapsed, viewport), OverlayPlacement::Hidden);
        assert_eq!(caption_placement(collapsed, viewport), OverlayPlacement::Hidden);
        assert!(toast_placement(None, viewport).is_visible());
    }

    #[test]
    fn test_close_button_sits_on_player_corner() {
        assert_eq!(
            close_button_placement(Dimensions { width: 400, height: 225 }),
            OverlayPlacement::Fixed { right: 25.0, bottom: 233.0 }
        );
    }
}
