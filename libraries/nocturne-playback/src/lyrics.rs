//! Time-synchronised lyric lines
//!
//! [`LyricsScheduler`] maps a playback position to the active line and
//! reports how long to wait before the next line becomes active. It keeps
//! no timers itself: the engine turns each returned delay into a
//! `LyricsAdvance` timer.

use crate::source::LyricsSource;
use crate::types::TrackSnapshot;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One timed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Offset from the start of the track
    pub timestamp: Duration,
    pub text: String,
}

impl LyricLine {
    pub fn new(timestamp: Duration, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }
}

/// Active-line tracker for the current track
#[derive(Debug, Clone, Default)]
pub struct LyricsScheduler {
    lines: Vec<LyricLine>,
    active: Option<usize>,
    suspended: bool,
}

impl LyricsScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lines for a newly opened track
    pub fn load(&mut self, mut lines: Vec<LyricLine>) {
        lines.sort_by_key(|line| line.timestamp);
        self.lines = lines;
        self.active = None;
        self.suspended = false;
    }

    pub fn clear(&mut self) {
        self.load(Vec::new());
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_line(&self) -> Option<&LyricLine> {
        self.active.and_then(|index| self.lines.get(index))
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Recompute the active line for `position`
    ///
    /// Returns the delay until the next line, or `None` when no line is
    /// left (or there are no lines at all).
    pub fn sync(&mut self, position: Duration) -> Option<Duration> {
        self.suspended = false;
        self.active = self
            .lines
            .iter()
            .rposition(|line| line.timestamp <= position);
        self.delay_to_next(position)
    }

    /// Make the following line active (a `LyricsAdvance` timer fired)
    ///
    /// Returns the delay until the line after it.
    pub fn advance(&mut self, position: Duration) -> Option<Duration> {
        if self.suspended {
            return None;
        }
        let next = self.active.map_or(0, |index| index + 1);
        if next >= self.lines.len() {
            return None;
        }
        self.active = Some(next);
        self.delay_to_next(position)
    }

    /// Stop scheduling while paused; the active line stays
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Continue after a pause, recomputed from the real position
    pub fn resume(&mut self, position: Duration) -> Option<Duration> {
        self.sync(position)
    }

    fn delay_to_next(&self, position: Duration) -> Option<Duration> {
        let next = self.active.map_or(0, |index| index + 1);
        self.lines
            .get(next)
            .map(|line| line.timestamp.saturating_sub(position))
    }
}

/// Reads `song.lrc` next to `song.mp3`
#[derive(Debug, Clone, Copy, Default)]
pub struct LrcFileSource;

impl LyricsSource for LrcFileSource {
    fn lines(&self, track: &TrackSnapshot) -> Vec<LyricLine> {
        let path = track.path.with_extension("lrc");
        match std::fs::read_to_string(&path) {
            Ok(text) => parse_lrc(&text),
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "No lyrics file");
                Vec::new()
            }
        }
    }
}

/// Parse LRC text
///
/// A line may carry several `[mm:ss.xx]` tags, each producing its own
/// entry. Tags that are not timestamps (`[ar:...]`, `[offset:...]`) and
/// untagged lines are skipped. The result is sorted by time.
pub fn parse_lrc(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut rest = raw.trim();
        let mut stamps = Vec::new();

        while let Some(tagged) = rest.strip_prefix('[') {
            let Some(end) = tagged.find(']') else {
                break;
            };
            match parse_timestamp(&tagged[..end]) {
                Some(stamp) => stamps.push(stamp),
                None => break,
            }
            rest = &tagged[end + 1..];
        }

        let lyric = rest.trim();
        lines.extend(stamps.into_iter().map(|stamp| LyricLine::new(stamp, lyric)));
    }

    lines.sort_by_key(|line| line.timestamp);
    lines
}

/// `mm:ss`, `mm:ss.xx` or `mm:ss.xxx`
fn parse_timestamp(tag: &str) -> Option<Duration> {
    let (minutes, seconds) = tag.split_once(':')?;
    let minutes: u64 = minutes.trim().parse().ok()?;

    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: u64 = whole.trim().parse().ok()?;
    if whole >= 60 {
        return None;
    }

    let millis = match fraction.len() {
        0 => 0,
        1..=3 if fraction.bytes().all(|b| b.is_ascii_digit()) => {
            let value: u64 = fraction.parse().ok()?;
            value * 10u64.pow(3 - fraction.len() as u32)
        }
        _ => return None,
    };

    Some(Duration::from_millis((minutes * 60 + whole) * 1000 + millis))
}
