//! Stitch PiP - Picture-in-Picture session management for web video
//!
//! Finds the video a user most likely wants, moves it into the best
//! available PiP surface (document window, native PiP, floating fallback)
//! and drives it from popup commands and keyboard shortcuts.

pub mod capability;
pub mod config;
pub mod dom;
pub mod error;
pub mod locator;
pub mod overlay;
pub mod pip;
pub mod router;
pub mod context;
pub mod messaging;
pub mod subtitles;
pub mod api;
pub mod capture;
pub mod sim;

// Re-export main types for easy access
pub use crate::capability::{Capability, PipCapabilities};
pub use crate::config::{Config, PlayerConfig, PlayerSize};
pub use crate::error::{PipError, PlatformError, Result};
pub use crate::locator::{VideoHandle, VideoLocator};
pub use crate::overlay::{OverlayHost, OverlayRegistry};
pub use crate::pip::{PipPlatform, PipSessionManager, PipState, PipStrategy};
pub use crate::router::{Command, CommandResponse, CommandRouter, KeyInput};
pub use crate::context::FrameContext;
pub use crate::messaging::{Messenger, PageLink};
pub use crate::subtitles::{Cue, CueTrack};
pub use crate::api::{OpenSubtitlesClient, SubtitleFinder, WhisperClient};
pub use crate::capture::TranscriptionPipeline;
