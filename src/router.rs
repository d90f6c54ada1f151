//! Command and keyboard dispatch for one frame context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::config::{ControlsConfig, PlayerConfig, PlayerSize};
use crate::dom::{NodeId, Page};
use crate::error::{PipError, Result};
use crate::locator::{VideoHandle, VideoLocator};
use crate::overlay::{OverlayRegistry, Severity};
use crate::pip::{PipSessionManager, PipState};
use crate::subtitles::CueTrack;

/// Browsers reject rates outside this range
const MIN_RATE: f64 = 0.0625;
const MAX_RATE: f64 = 16.0;
const RATE_EPSILON: f64 = 1e-6;
/// Keyboard window nudges, in pixels
const WINDOW_STEP: i32 = 20;

/// Cross-context command, as sent by the popup or the extension background
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    TogglePip {
        #[serde(default, rename = "targetIndex")]
        target_index: Option<usize>,
        #[serde(default, rename = "frameId")]
        frame_id: Option<u32>,
    },
    ClosePip,
    UpdateSize {
        size: PlayerSize,
    },
    VideoCommand(VideoCommand),
    GetVideoMetadata,
    InjectSubtitle {
        content: String,
    },
    UpdateAiSubtitles {
        content: String,
        #[serde(default)]
        offset: f64,
    },
    AdjustSubtitleSync {
        seconds: f64,
    },
}

/// Direct media operation on the resolved video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum VideoCommand {
    #[serde(rename = "togglePlayPause")]
    TogglePlayPause,
    #[serde(rename = "seek_relative")]
    SeekRelative {
        #[serde(default)]
        delta: f64,
    },
    /// Seek to a fraction 0..1 of the duration
    #[serde(rename = "seek")]
    Seek { pct: f64 },
    #[serde(rename = "toggleMute")]
    ToggleMute,
    #[serde(rename = "set_volume")]
    SetVolume { volume: f64 },
    #[serde(rename = "set_speed")]
    SetSpeed { speed: f64 },
    #[serde(rename = "toggleLoop")]
    ToggleLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    pub url: String,
    pub duration: Option<f64>,
    pub current_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    State { state: PipState },
    Applied,
    Metadata { metadata: Option<VideoMetadata> },
    Subtitles { cues: usize },
    Ignored,
    Failed { message: String },
}

/// Where a key event was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrigin {
    #[default]
    Page,
    /// Focus is inside the document PiP window
    PipWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyInput {
    /// DOM `KeyboardEvent.key`
    pub key: String,
    pub alt: bool,
    pub shift: bool,
    pub ctrl: bool,
    pub origin: KeyOrigin,
}

impl KeyInput {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn from_window(mut self) -> Self {
        self.origin = KeyOrigin::PipWindow;
        self
    }

    /// Parse a compact chord such as `alt+p`, `shift+>` or `space`.
    /// A `pip:` prefix marks keys from the PiP window.
    pub fn parse(chord: &str) -> Self {
        let (origin, chord) = match chord.strip_prefix("pip:") {
            Some(rest) => (KeyOrigin::PipWindow, rest),
            None => (KeyOrigin::Page, chord),
        };

        let mut input = KeyInput {
            origin,
            ..KeyInput::default()
        };
        let mut parts: Vec<&str> = chord.split('+').collect();
        // A trailing empty part means the key itself was '+'
        let key = match parts.pop() {
            Some("") => "+",
            Some(key) => key,
            None => "",
        };
        for modifier in parts.iter().filter(|m| !m.is_empty()) {
            match modifier.to_lowercase().as_str() {
                "alt" => input.alt = true,
                "shift" => input.shift = true,
                "ctrl" => input.ctrl = true,
                other => debug!("Unknown modifier {}", other),
            }
        }
        input.key = match key.to_lowercase().as_str() {
            "space" => " ".to_string(),
            "left" => "ArrowLeft".to_string(),
            "right" => "ArrowRight".to_string(),
            "up" => "ArrowUp".to_string(),
            "down" => "ArrowDown".to_string(),
            _ => key.to_string(),
        };
        input
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    TogglePip,
    ClosePip,
    TogglePlay,
    ToggleMute,
    SeekBackward,
    SeekForward,
    VolumeUp,
    VolumeDown,
    SpeedUp,
    SpeedDown,
    ToggleHelp,
    GrowWindow,
    ShrinkWindow,
    MoveWindow { dx: i32, dy: i32 },
}

impl Shortcut {
    /// Default key bindings
    pub fn from_key(input: &KeyInput) -> Option<Shortcut> {
        if input.origin == KeyOrigin::PipWindow && input.alt {
            let shortcut = match input.key.as_str() {
                "+" | "=" => Some(Shortcut::GrowWindow),
                "-" => Some(Shortcut::ShrinkWindow),
                "ArrowUp" => Some(Shortcut::MoveWindow { dx: 0, dy: -WINDOW_STEP }),
                "ArrowDown" => Some(Shortcut::MoveWindow { dx: 0, dy: WINDOW_STEP }),
                "ArrowLeft" => Some(Shortcut::MoveWindow { dx: -WINDOW_STEP, dy: 0 }),
                "ArrowRight" => Some(Shortcut::MoveWindow { dx: WINDOW_STEP, dy: 0 }),
                _ => None,
            };
            if shortcut.is_some() {
                return shortcut;
            }
        }

        match input.key.to_lowercase().as_str() {
            "p" if input.alt => Some(Shortcut::TogglePip),
            "x" if input.alt => Some(Shortcut::ClosePip),
            " " => Some(Shortcut::TogglePlay),
            "m" => Some(Shortcut::ToggleMute),
            "arrowleft" if !input.alt => Some(Shortcut::SeekBackward),
            "arrowright" if !input.alt => Some(Shortcut::SeekForward),
            "arrowup" if input.alt => Some(Shortcut::VolumeUp),
            "arrowdown" if input.alt => Some(Shortcut::VolumeDown),
            ">" if input.shift => Some(Shortcut::SpeedUp),
            "<" if input.shift => Some(Shortcut::SpeedDown),
            "h" => Some(Shortcut::ToggleHelp),
            _ => None,
        }
    }
}

/// Next higher ladder entry, saturating at the top
pub fn ladder_up(ladder: &[f64], current: f64) -> f64 {
    ladder
        .iter()
        .copied()
        .find(|speed| *speed > current + RATE_EPSILON)
        .or_else(|| ladder.last().copied())
        .unwrap_or(current)
}

/// Next lower ladder entry, saturating at the bottom
pub fn ladder_down(ladder: &[f64], current: f64) -> f64 {
    ladder
        .iter()
        .rev()
        .copied()
        .find(|speed| *speed < current - RATE_EPSILON)
        .or_else(|| ladder.first().copied())
        .unwrap_or(current)
}

/// Catalogue ids (`ABC-123`) win; otherwise bracketed fragments are dropped
pub fn clean_title(title: &str) -> String {
    if let Ok(re) = Regex::new(r"([A-Za-z]{2,6}-?\d{3,4})") {
        if let Some(caps) = re.captures(title) {
            return caps[1].to_uppercase();
        }
    }

    let mut cleaned = title.to_string();
    for pattern in [r"\[.*?\]", r"\(.*?\)"] {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }
    cleaned.trim().to_string()
}

fn status_message(error: &PipError) -> String {
    match error {
        PipError::NoVideo => "No video found 🚫".to_string(),
        PipError::InvalidTarget(_) => "Video not found 🚫".to_string(),
        PipError::Blocked(_) => "PiP disabled on this site 🚫".to_string(),
        other => other.to_string(),
    }
}

/// Translates commands and key presses into session transitions or direct
/// media operations on the resolved video.
pub struct CommandRouter {
    page: Rc<dyn Page>,
    locator: VideoLocator,
    manager: Rc<PipSessionManager>,
    overlays: Rc<OverlayRegistry>,
    player: RefCell<PlayerConfig>,
    controls: ControlsConfig,
    subtitles: RefCell<CueTrack>,
}

impl CommandRouter {
    pub fn new(
        page: Rc<dyn Page>,
        locator: VideoLocator,
        manager: Rc<PipSessionManager>,
        overlays: Rc<OverlayRegistry>,
        player: PlayerConfig,
        controls: ControlsConfig,
    ) -> Self {
        Self {
            page,
            locator,
            manager,
            overlays,
            player: RefCell::new(player),
            controls,
            subtitles: RefCell::new(CueTrack::new()),
        }
    }

    pub fn player(&self) -> PlayerConfig {
        self.player.borrow().clone()
    }

    pub fn is_blocked(&self) -> bool {
        self.player.borrow().is_blocked(&self.page.url())
    }

    /// The session's bound video when active, otherwise the primary video
    pub fn resolve_target(&self) -> Option<VideoHandle> {
        if let Some(node) = self.manager.bound_video() {
            if let Some(handle) = self.locator.refresh(node) {
                return Some(handle);
            }
            debug!("Bound video {:?} no longer readable, using primary", node);
        }
        self.locator.locate_primary()
    }

    /// Handle a command. Failures become a status toast plus a `Failed` response.
    pub async fn dispatch(&self, command: Command) -> CommandResponse {
        debug!("📨 Command {:?}", command);
        match self.try_dispatch(command).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Command failed: {}", e);
                self.overlays.toast(&status_message(&e), Severity::Error);
                CommandResponse::Failed { message: e.to_string() }
            }
        }
    }

    async fn try_dispatch(&self, command: Command) -> Result<CommandResponse> {
        match command {
            Command::TogglePip { target_index, .. } => {
                let state = self.toggle(target_index).await?;
                Ok(CommandResponse::State { state })
            }
            Command::ClosePip => {
                self.manager.close().await;
                Ok(CommandResponse::State { state: self.manager.state() })
            }
            Command::UpdateSize { size } => {
                self.player.borrow_mut().player_size = size;
                self.manager.resize(size).await;
                Ok(CommandResponse::State { state: self.manager.state() })
            }
            Command::VideoCommand(video_command) => {
                let target = self.resolve_target().ok_or(PipError::NoVideo)?;
                if let Some(message) = self.apply_video_command(target.node, &video_command) {
                    self.overlays.toast(&message, Severity::Info);
                }
                Ok(CommandResponse::Applied)
            }
            Command::GetVideoMetadata => Ok(CommandResponse::Metadata {
                metadata: self.metadata(),
            }),
            Command::InjectSubtitle { content } => {
                let cues = self.subtitles.borrow_mut().inject(&content, 0.0);
                info!("📝 Injected {} subtitle cues", cues);
                self.refresh_caption();
                Ok(CommandResponse::Subtitles { cues })
            }
            Command::UpdateAiSubtitles { content, offset } => {
                let cues = self.subtitles.borrow_mut().inject(&content, offset);
                debug!("📝 {} live cues at {:.1}s", cues, offset);
                self.refresh_caption();
                Ok(CommandResponse::Subtitles { cues })
            }
            Command::AdjustSubtitleSync { seconds } => {
                let offset = self.subtitles.borrow_mut().adjust_sync(seconds);
                let sign = if offset > 0.0 { "+" } else { "" };
                self.overlays.toast(&format!("Sync: {}{}s", sign, offset), Severity::Info);
                self.refresh_caption();
                Ok(CommandResponse::Applied)
            }
        }
    }

    async fn toggle(&self, target_index: Option<usize>) -> Result<PipState> {
        if self.manager.session().is_some() {
            return self.manager.toggle(None).await;
        }
        if self.is_blocked() {
            return Err(PipError::Blocked(self.page.url()));
        }

        let target = match target_index {
            Some(index) => Some(
                self.locator
                    .locate_all()
                    .into_iter()
                    .nth(index)
                    .ok_or(PipError::InvalidTarget(index))?,
            ),
            None => self.locator.locate_primary(),
        };
        let target = target.ok_or(PipError::NoVideo)?;
        self.manager.toggle(Some(&target)).await
    }

    /// Handle a key press; returns whether it was consumed
    pub async fn handle_key(&self, input: &KeyInput) -> bool {
        if input.origin == KeyOrigin::Page && self.page.focus_is_editable() {
            return false;
        }
        let Some(shortcut) = Shortcut::from_key(input) else {
            return false;
        };
        debug!("⌨️ {:?}", shortcut);

        match shortcut {
            Shortcut::TogglePip => {
                self.dispatch(Command::TogglePip {
                    target_index: None,
                    frame_id: None,
                })
                .await;
                return true;
            }
            Shortcut::ClosePip => {
                self.manager.close().await;
                return true;
            }
            Shortcut::ToggleHelp => {
                self.overlays.toggle_help();
                return true;
            }
            Shortcut::GrowWindow => return self.manager.resize_window_by(WINDOW_STEP).await,
            Shortcut::ShrinkWindow => return self.manager.resize_window_by(-WINDOW_STEP).await,
            Shortcut::MoveWindow { dx, dy } => return self.manager.move_window(dx, dy).await,
            _ => {}
        }

        let Some(target) = self.resolve_target() else {
            return false;
        };
        let (message, severity) = self.apply_shortcut(target.node, shortcut);
        if let Some(message) = message {
            self.overlays.toast(&message, severity);
        }
        true
    }

    fn apply_shortcut(&self, video: NodeId, shortcut: Shortcut) -> (Option<String>, Severity) {
        let page = &*self.page;
        let Some(media) = page.media(video) else {
            return (None, Severity::Info);
        };

        match shortcut {
            Shortcut::TogglePlay => {
                if media.paused {
                    if let Err(e) = page.play(video) {
                        warn!("▶️ Play rejected: {}", e);
                    }
                    (Some("Playing ▶️".to_string()), Severity::Success)
                } else {
                    page.pause(video);
                    (Some("Paused ⏸️".to_string()), Severity::Info)
                }
            }
            Shortcut::ToggleMute => {
                page.set_muted(video, !media.muted);
                let message = if media.muted { "Unmuted 🔊" } else { "Muted 🔇" };
                (Some(message.to_string()), Severity::Info)
            }
            Shortcut::SeekBackward => {
                self.seek_relative(video, -self.controls.seek_step);
                (Some(format!("Rewind {}s ⏪", self.controls.seek_step)), Severity::Info)
            }
            Shortcut::SeekForward => {
                self.seek_relative(video, self.controls.seek_step);
                (Some(format!("Forward {}s ⏩", self.controls.seek_step)), Severity::Info)
            }
            Shortcut::VolumeUp => {
                let volume = (media.volume + self.controls.volume_step).min(1.0);
                page.set_volume(video, volume);
                (Some(format!("Volume: {}% 🔊", (volume * 100.0).round())), Severity::Success)
            }
            Shortcut::VolumeDown => {
                let volume = (media.volume - self.controls.volume_step).max(0.0);
                page.set_volume(video, volume);
                let icon = if volume <= 0.0 { "🔇" } else { "🔉" };
                (Some(format!("Volume: {}% {}", (volume * 100.0).round(), icon)), Severity::Warning)
            }
            Shortcut::SpeedUp => {
                let speed = ladder_up(&self.controls.speed_ladder, media.playback_rate);
                page.set_playback_rate(video, speed);
                (Some(format!("Speed: {}x ⏩", speed)), Severity::Success)
            }
            Shortcut::SpeedDown => {
                let speed = ladder_down(&self.controls.speed_ladder, media.playback_rate);
                page.set_playback_rate(video, speed);
                (Some(format!("Speed: {}x ⏪", speed)), Severity::Success)
            }
            _ => (None, Severity::Info),
        }
    }

    /// Returns a status message for commands that announce themselves
    fn apply_video_command(&self, video: NodeId, command: &VideoCommand) -> Option<String> {
        let page = &*self.page;
        let media = page.media(video)?;

        match command {
            VideoCommand::TogglePlayPause => {
                if media.paused {
                    if let Err(e) = page.play(video) {
                        warn!("▶️ Play rejected: {}", e);
                    }
                } else {
                    page.pause(video);
                }
                None
            }
            VideoCommand::SeekRelative { delta } => {
                self.seek_relative(video, *delta);
                None
            }
            VideoCommand::Seek { pct } => {
                match media.finite_duration() {
                    Some(duration) => page.set_current_time(video, pct.clamp(0.0, 1.0) * duration),
                    None => debug!("Seek ignored, duration unknown"),
                }
                None
            }
            VideoCommand::ToggleMute => {
                page.set_muted(video, !media.muted);
                None
            }
            VideoCommand::SetVolume { volume } => {
                page.set_volume(video, volume.clamp(0.0, 1.0));
                if media.muted && *volume > 0.0 {
                    page.set_muted(video, false);
                }
                None
            }
            VideoCommand::SetSpeed { speed } => {
                if speed.is_finite() && *speed > 0.0 {
                    page.set_playback_rate(video, speed.clamp(MIN_RATE, MAX_RATE));
                } else {
                    warn!("Ignoring invalid speed {}", speed);
                }
                None
            }
            VideoCommand::ToggleLoop => {
                page.set_loop(video, !media.looping);
                Some(format!("Loop: {}", if media.looping { "OFF" } else { "ON 🔁" }))
            }
        }
    }

    /// Seek by `delta`, clamped to [0, duration] when the duration is known
    fn seek_relative(&self, video: NodeId, delta: f64) {
        let Some(media) = self.page.media(video) else {
            return;
        };
        let mut target = (media.current_time + delta).max(0.0);
        if let Some(duration) = media.finite_duration() {
            target = target.min(duration);
        }
        self.page.set_current_time(video, target);
    }

    /// Title, url and timing of the resolved video
    pub fn metadata(&self) -> Option<VideoMetadata> {
        let target = self.resolve_target()?;
        Some(VideoMetadata {
            title: clean_title(&self.page.title()),
            url: self.page.url(),
            duration: target.media.finite_duration(),
            current_time: target.media.current_time,
        })
    }

    /// Show the cue for the resolved video's current time
    pub fn refresh_caption(&self) {
        let time = self
            .resolve_target()
            .map(|target| target.media.current_time);
        match time {
            Some(time) => self.update_caption(time),
            None => self.overlays.set_caption(None),
        }
    }

    /// Caption lookup for a time update
    pub fn update_caption(&self, current_time: f64) {
        let subtitles = self.subtitles.borrow();
        let text = subtitles.cue_at(current_time).map(|cue| cue.text.clone());
        self.overlays.set_caption(text.as_deref());
    }

    pub fn subtitle_count(&self) -> usize {
        self.subtitles.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LADDER: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

    #[test]
    fn test_ladder_saturates() {
        assert_eq!(ladder_up(&LADDER, 1.0), 1.25);
        assert_eq!(ladder_up(&LADDER, 2.0), 2.0);
        assert_eq!(ladder_down(&LADDER, 1.0), 0.75);
        assert_eq!(ladder_down(&LADDER, 0.25), 0.25);
        assert_eq!(ladder_up(&LADDER, 1.1), 1.25);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Watch abc-123 in HD"), "ABC-123");
        assert_eq!(clean_title("xyz456 trailer"), "XYZ456");
        assert_eq!(clean_title("[Fansub] Show Name (2019) "), "Show Name");
    }

    #[test]
    fn test_default_bindings() {
        assert_eq!(Shortcut::from_key(&KeyInput::new("p").alt()), Some(Shortcut::TogglePip));
        assert_eq!(Shortcut::from_key(&KeyInput::new("P").alt()), Some(Shortcut::TogglePip));
        assert_eq!(Shortcut::from_key(&KeyInput::new("p")), None);
        assert_eq!(Shortcut::from_key(&KeyInput::new(" ")), Some(Shortcut::TogglePlay));
        assert_eq!(Shortcut::from_key(&KeyInput::new("ArrowLeft")), Some(Shortcut::SeekBackward));
        assert_eq!(Shortcut::from_key(&KeyInput::new("ArrowUp")), None);
        assert_eq!(Shortcut::from_key(&KeyInput::new("ArrowUp").alt()), Some(Shortcut::VolumeUp));
        assert_eq!(Shortcut::from_key(&KeyInput::new(">").shift()), Some(Shortcut::SpeedUp));
        assert_eq!(Shortcut::from_key(&KeyInput::new(">")), None);
    }

    #[test]
    fn test_window_bindings() {
        let key = KeyInput::new("ArrowUp").alt().from_window();
        assert_eq!(Shortcut::from_key(&key), Some(Shortcut::MoveWindow { dx: 0, dy: -20 }));
        assert_eq!(Shortcut::from_key(&KeyInput::new("=").alt().from_window()), Some(Shortcut::GrowWindow));
        assert_eq!(Shortcut::from_key(&KeyInput::new("x").alt().from_window()), Some(Shortcut::ClosePip));
    }

    #[test]
    fn test_parse_chords() {
        assert_eq!(KeyInput::parse("alt+p"), KeyInput::new("p").alt());
        assert_eq!(KeyInput::parse("shift+>"), KeyInput::new(">").shift());
        assert_eq!(KeyInput::parse("space"), KeyInput::new(" "));
        assert_eq!(KeyInput::parse("pip:alt++"), KeyInput::new("+").alt().from_window());
    }

    #[test]
    fn test_command_wire_format() {
        let command: Command =
            serde_json::from_str(r#"{"type": "VIDEO_COMMAND", "command": "set_volume", "volume": 0.4}"#).unwrap();
        assert_eq!(command, Command::VideoCommand(VideoCommand::SetVolume { volume: 0.4 }));

        let toggle: Command = serde_json::from_str(r#"{"type": "TOGGLE_PIP", "targetIndex": 1}"#).unwrap();
        assert_eq!(
            toggle,
            Command::TogglePip {
                target_index: Some(1),
                frame_id: None
            }
        );

        let size: Command = serde_json::from_str(r#"{"type": "UPDATE_SIZE", "size": "large"}"#).unwrap();
        assert_eq!(size, Command::UpdateSize { size: PlayerSize::Large });
    }
}
