//! Subtitle cues: parsing fetched or transcribed SRT/VTT text and looking
//! up the cue for the current playback time.

pub mod cue;

pub use cue::{format_timestamp, parse_cues, parse_timestamp, Cue, CueTrack};
