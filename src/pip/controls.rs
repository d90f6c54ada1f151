//! Transport controls rendered inside a document PiP window.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dom::{FrameImage, ListenerId, MediaEventKind, NodeId, Page};
use crate::overlay::{OverlayId, OverlayKind, OverlayPlacement, OverlayRegistry, OverlayView};

use super::WindowId;

/// Speed button cycle; an off-cycle rate jumps back to the first entry
pub const SPEED_CYCLE: [f64; 5] = [1.0, 1.25, 1.5, 2.0, 0.5];

/// Visual filters, applied as `stitch-filter-<name>` classes
pub const FILTERS: [&str; 5] = ["none", "grayscale", "sepia", "invert", "contrast"];

const FILTER_CLASS_PREFIX: &str = "stitch-filter-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    TogglePlay,
    SeekBackward,
    SeekForward,
    ToggleLoop,
    CycleSpeed,
    CycleFilter,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    Playing(bool),
    Seeked(f64),
    Loop(bool),
    Speed(f64),
    Filter(&'static str),
    Snapshot(FrameImage),
    /// Frame export refused (cross-origin or protected media)
    SnapshotBlocked(String),
}

/// Next rate in [`SPEED_CYCLE`]
pub fn next_speed(current: f64) -> f64 {
    match SPEED_CYCLE.iter().position(|rate| (rate - current).abs() < 1e-6) {
        Some(i) => SPEED_CYCLE[(i + 1) % SPEED_CYCLE.len()],
        None => SPEED_CYCLE[0],
    }
}

pub struct ControlOverlay {
    video: NodeId,
    window: WindowId,
    overlay: OverlayId,
    listener: ListenerId,
    playing: bool,
    looping: bool,
    speed: f64,
    filter: usize,
}

impl ControlOverlay {
    /// Mount the control bar and mirror the video's play/pause events
    pub fn bind(page: &dyn Page, overlays: &OverlayRegistry, video: NodeId, window: WindowId) -> Self {
        let media = page.media(video).unwrap_or_default();
        let listener = page.add_media_listener(video, &[MediaEventKind::Play, MediaEventKind::Pause]);

        let mut controls = Self {
            video,
            window,
            overlay: OverlayId(0),
            listener,
            playing: !media.paused,
            looping: media.looping,
            speed: media.playback_rate,
            filter: 0,
        };
        controls.overlay = overlays.mount(&controls.view());
        debug!("🎛️ Controls bound to {:?} in {:?}", video, window);
        controls
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn filter(&self) -> &'static str {
        FILTERS[self.filter]
    }

    pub fn apply(
        &mut self,
        page: &dyn Page,
        overlays: &OverlayRegistry,
        action: ControlAction,
        seek_step: f64,
    ) -> ControlOutcome {
        let media = page.media(self.video).unwrap_or_default();
        let outcome = match action {
            ControlAction::TogglePlay => {
                if media.paused {
                    if let Err(e) = page.play(self.video) {
                        warn!("▶️ Play rejected: {}", e);
                    }
                } else {
                    page.pause(self.video);
                }
                self.playing = page.media(self.video).is_some_and(|m| !m.paused);
                ControlOutcome::Playing(self.playing)
            }
            ControlAction::SeekBackward | ControlAction::SeekForward => {
                let delta = if action == ControlAction::SeekForward { seek_step } else { -seek_step };
                let mut target = (media.current_time + delta).max(0.0);
                if let Some(duration) = media.finite_duration() {
                    target = target.min(duration);
                }
                page.set_current_time(self.video, target);
                ControlOutcome::Seeked(target)
            }
            ControlAction::ToggleLoop => {
                self.looping = !media.looping;
                page.set_loop(self.video, self.looping);
                ControlOutcome::Loop(self.looping)
            }
            ControlAction::CycleSpeed => {
                self.speed = next_speed(media.playback_rate);
                page.set_playback_rate(self.video, self.speed);
                ControlOutcome::Speed(self.speed)
            }
            ControlAction::CycleFilter => {
                page.toggle_class(self.video, &filter_class(FILTERS[self.filter]), false);
                self.filter = (self.filter + 1) % FILTERS.len();
                if self.filter != 0 {
                    page.toggle_class(self.video, &filter_class(FILTERS[self.filter]), true);
                }
                ControlOutcome::Filter(FILTERS[self.filter])
            }
            ControlAction::Snapshot => match page.capture_frame(self.video) {
                Ok(image) => {
                    debug!("📸 Snapshot {}x{} ({} bytes)", image.width, image.height, image.bytes.len());
                    ControlOutcome::Snapshot(image)
                }
                Err(e) => {
                    warn!("📸 Snapshot blocked: {}", e);
                    ControlOutcome::SnapshotBlocked(e.to_string())
                }
            },
        };
        overlays.update(self.overlay, &self.view());
        outcome
    }

    /// Mirror a native play/pause event into the play button
    pub fn sync(&mut self, overlays: &OverlayRegistry, kind: MediaEventKind) {
        let playing = kind == MediaEventKind::Play;
        if self.playing != playing {
            self.playing = playing;
            overlays.update(self.overlay, &self.view());
        }
    }

    /// Remove the bar, the listener and any filter class
    pub fn unbind(self, page: &dyn Page, overlays: &OverlayRegistry) {
        page.remove_media_listener(self.listener);
        if self.filter != 0 {
            page.toggle_class(self.video, &filter_class(FILTERS[self.filter]), false);
        }
        overlays.unmount(self.overlay);
        debug!("🎛️ Controls unbound from {:?}", self.video);
    }

    fn view(&self) -> OverlayView {
        let play = if self.playing { "⏸" } else { "▶" };
        let looping = if self.looping { "🔁 on" } else { "🔁 off" };
        OverlayView {
            kind: OverlayKind::Controls,
            text: format!(
                "{} | ⏪ | ⏩ | {} | {}x | {} | 📷",
                play,
                looping,
                self.speed,
                FILTERS[self.filter]
            ),
            severity: None,
            placement: OverlayPlacement::InWindow { window: self.window },
        }
    }
}

fn filter_class(name: &str) -> String {
    format!("{}{}", FILTER_CLASS_PREFIX, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_cycle_wraps() {
        let mut rate = 1.0;
        for _ in 0..4 {
            rate = next_speed(rate);
        }
        assert_eq!(rate, 0.5);
        assert_eq!(next_speed(0.5), 1.0);
    }

    #[test]
    fn test_off_cycle_speed_resets() {
        assert_eq!(next_speed(1.75), 1.0);
        assert_eq!(next_speed(3.0), 1.0);
    }

    #[test]
    fn test_filter_class_names() {
        assert_eq!(filter_class(FILTERS[1]), "stitch-filter-grayscale");
    }
}
