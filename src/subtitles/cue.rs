use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

const TIMING_PATTERN: &str = r"((?:\d{2}:)?\d{2}:\d{2}[.,]\d{3}) --> ((?:\d{2}:)?\d{2}:\d{2}[.,]\d{3})";

/// A single timed subtitle line (or lines)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start, in seconds of video time
    pub start: f64,
    /// End, in seconds of video time
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Inclusive at both ends
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} --> {}\n{}\n",
            format_timestamp(self.start),
            format_timestamp(self.end),
            self.text
        )
    }
}

/// Parse SRT or WebVTT text into cues, shifting every cue by `offset` seconds.
/// Blocks without a timing line or without text are dropped.
pub fn parse_cues(content: &str, offset: f64) -> Vec<Cue> {
    let timing = match Regex::new(TIMING_PATTERN) {
        Ok(re) => re,
        Err(e) => {
            warn!("Invalid cue timing pattern: {}", e);
            return Vec::new();
        }
    };

    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let mut span: Option<(f64, f64)> = None;
        let mut lines: Vec<&str> = Vec::new();

        for line in block.lines() {
            if line.contains("WEBVTT") || is_index_line(line) {
                continue;
            }

            if let Some(caps) = timing.captures(line) {
                let start = parse_timestamp(&caps[1]);
                let end = parse_timestamp(&caps[2]);
                if let (Ok(start), Ok(end)) = (start, end) {
                    span = Some((start, end));
                }
            } else if !line.trim().is_empty() {
                lines.push(line.trim());
            }
        }

        if let Some((start, end)) = span {
            if !lines.is_empty() {
                cues.push(Cue::new(start + offset, end + offset, lines.join("\n")));
            }
        }
    }

    debug!("📝 Parsed {} cues (offset {:.1}s)", cues.len(), offset);
    cues
}

fn is_index_line(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// Parse `MM:SS.mmm` or `HH:MM:SS,mmm` into seconds
pub fn parse_timestamp(timestamp: &str) -> Result<f64> {
    let normalized = timestamp.trim().replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(anyhow!("Invalid timestamp: {}", timestamp)),
    };

    let hours: u64 = hours.parse()?;
    let minutes: u64 = minutes.parse()?;
    let seconds: f64 = seconds.parse()?;
    Ok((hours * 3600 + minutes * 60) as f64 + seconds)
}

/// Format seconds as `HH:MM:SS.mmm`
pub fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Cues for the bound video, fed by subtitle downloads and live transcription
#[derive(Debug, Clone, Default)]
pub struct CueTrack {
    cues: Vec<Cue>,
    sync_offset: f64,
}

impl CueTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset 0 replaces the whole track. A later offset keeps the cues that
    /// ended before it and appends the new chunk's cues.
    pub fn inject(&mut self, content: &str, offset: f64) -> usize {
        let cues = parse_cues(content, offset);
        let added = cues.len();

        if offset > 0.0 {
            self.cues.retain(|cue| cue.end < offset);
            self.cues.extend(cues);
        } else {
            self.cues = cues;
        }
        added
    }

    /// Cue showing at `time`, honouring the user sync offset
    pub fn cue_at(&self, time: f64) -> Option<&Cue> {
        let shifted = time - self.sync_offset;
        self.cues.iter().find(|cue| cue.contains(shifted))
    }

    /// Shift all cues by `delta` seconds; returns the accumulated offset
    pub fn adjust_sync(&mut self, delta: f64) -> f64 {
        self.sync_offset += delta;
        self.sync_offset
    }

    pub fn sync_offset(&self) -> f64 {
        self.sync_offset
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn clear(&mut self) {
        self.cues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VTT: &str = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:03.500\nHello there\n\n2\n00:04.000 --> 00:06.000\nSecond line\nwraps here\n";

    #[test]
    fn test_parse_vtt() {
        let cues = parse_cues(VTT, 0.0);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], Cue::new(1.0, 3.5, "Hello there"));
        assert_eq!(cues[1].start, 4.0);
        assert_eq!(cues[1].text, "Second line\nwraps here");
    }

    #[test]
    fn test_parse_srt_with_offset() {
        let srt = "1\r\n00:00:10,000 --> 00:00:12,250\r\nSRT text\r\n\r\n2\r\n00:00:13,000 --> 00:00:14,000\r\n\r\n";
        let cues = parse_cues(srt, 30.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].start, 40.0);
        assert_eq!(cues[0].end, 42.25);
    }

    #[test]
    fn test_timestamp_round_trip_formats() {
        assert_eq!(parse_timestamp("01:01:01,500").unwrap(), 3661.5);
        assert_eq!(parse_timestamp("02:03.250").unwrap(), 123.25);
        assert!(parse_timestamp("bogus").is_err());
        assert_eq!(format_timestamp(3661.5), "01:01:01.500");
    }

    #[test]
    fn test_inject_replaces_then_appends() {
        let mut track = CueTrack::new();
        track.inject(VTT, 0.0);
        assert_eq!(track.len(), 2);

        let chunk = "WEBVTT\n\n00:00.000 --> 00:02.000\nLive chunk\n";
        track.inject(chunk, 5.0);
        // First cue ended at 3.5 < 5 and survives, second (4..6) is dropped
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues()[1], Cue::new(5.0, 7.0, "Live chunk"));

        track.inject(chunk, 0.0);
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_cue_lookup_inclusive_with_sync() {
        let mut track = CueTrack::new();
        track.inject(VTT, 0.0);
        assert_eq!(track.cue_at(3.5).map(|c| c.text.as_str()), Some("Hello there"));
        assert!(track.cue_at(3.75).is_none());

        assert_eq!(track.adjust_sync(0.5), 0.5);
        assert!(track.cue_at(1.25).is_none());
        assert!(track.cue_at(4.0).is_some());
    }
}
