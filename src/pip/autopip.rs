use std::cell::Cell;
use tracing::debug;

use crate::dom::MediaSnapshot;

use super::session::SessionId;

/// Videos at or below this length never auto-open
const MIN_DURATION_SECS: f64 = 10.0;
/// Playback must be past this point before hiding the tab triggers PiP
const MIN_PLAYED_SECS: f64 = 3.0;

/// Opens native PiP when the tab is hidden mid-playback and closes it again
/// when the tab returns, but only for sessions it opened itself.
#[derive(Debug, Default)]
pub struct AutoPip {
    enabled: bool,
    opened: Cell<Option<SessionId>>,
}

impl AutoPip {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            opened: Cell::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether hiding the page should open PiP for a video in this state
    pub fn should_open(&self, media: &MediaSnapshot, session_active: bool) -> bool {
        if !self.enabled || session_active {
            return false;
        }
        let long_enough = media.finite_duration().map_or(true, |d| d > MIN_DURATION_SECS);
        !media.paused && !media.muted && long_enough && media.current_time > MIN_PLAYED_SECS
    }

    pub fn mark_opened(&self, session: SessionId) {
        debug!("🤖 Auto-PiP opened session {:?}", session);
        self.opened.set(Some(session));
    }

    /// Take the auto-opened session to close, if it is still the live one
    pub fn take_for_close(&self, live: Option<SessionId>) -> Option<SessionId> {
        let opened = self.opened.take()?;
        (live == Some(opened)).then_some(opened)
    }
}
