//! Core types for playback management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stable identifier of a playable item in the library
///
/// The engine never owns track metadata; it only moves these around and
/// asks the library for a [`TrackSnapshot`] when a track is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Metadata of the currently opened track
///
/// Refreshed synchronously whenever the open position changes, so the
/// engine never holds a live handle into the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Library identifier
    pub id: TrackId,

    /// File path handed to the media player
    pub path: PathBuf,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album name
    pub album: String,

    /// Track duration as known by the library
    pub duration: Duration,

    /// Saved resume point (long-form items only)
    pub bookmark: Duration,

    /// Podcast/audiobook style item that keeps a resume bookmark
    pub long_form: bool,
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No track opened
    Idle,

    /// Track opened but never started
    Open,

    /// Currently playing
    Playing,

    /// Paused by the user (or by the queue running out)
    PausedUser,

    /// Paused because a call or focus loss interrupted playback
    PausedFocusTransient,
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when queue ends
    #[default]
    Off,

    /// Loop current track only
    Current,

    /// Loop entire queue
    All,
}

impl RepeatMode {
    /// Integer code used by the persisted state
    pub fn code(self) -> i64 {
        match self {
            Self::Off => 0,
            Self::Current => 1,
            Self::All => 2,
        }
    }

    /// Parse a persisted code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Current),
            2 => Some(Self::All),
            _ => None,
        }
    }
}

/// Shuffle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    /// No shuffling
    #[default]
    Off,

    /// Non-repeating random picks tracked through the history
    Normal,

    /// Party shuffle: sequential advance over an externally refilled queue
    Auto,
}

impl ShuffleMode {
    /// Integer code used by the persisted state
    pub fn code(self) -> i64 {
        match self {
            Self::Off => 0,
            Self::Normal => 1,
            Self::Auto => 2,
        }
    }

    /// Parse a persisted code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Normal),
            2 => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Where enqueued tracks go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnqueueAction {
    /// Append and start playing the first appended track
    Now,

    /// Insert right after the current track
    Next,

    /// Append at the end
    Last,
}

/// Audio focus standing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FocusState {
    /// Focus never requested
    #[default]
    Unfocused,
    Gained,
    LostTransientDuckable,
    LostTransient,
    LostPermanent,
}

/// Telephony call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    Ringing,
    OffHook,
}

/// Configuration for the playback engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Idle debounce before the engine persists and releases everything (default: 60s)
    pub idle_shutdown_ms: u64,

    /// Fade ramp cadence (default: 10ms)
    pub fade_tick_ms: u64,

    /// Volume gained per fade-up tick (default: 0.01)
    pub fade_up_step: f32,

    /// Volume lost per fade-down tick (default: 0.05)
    pub fade_down_step: f32,

    /// Lowest volume a duck fade reaches (default: 0.2)
    pub duck_floor: f32,

    /// Attenuation applied on transient focus loss (default: -8 dB)
    pub transient_attenuation_db: f32,

    /// Automatic skips after a failed open before giving up (default: 10)
    pub max_open_retries: u32,

    /// Shuffle history size (default: 100)
    pub max_history: usize,

    /// Storage volume the queue is saved against
    pub card_id: i64,

    /// Delay before reopening after the player backend died (default: 2s)
    pub server_died_delay_ms: u64,

    /// `play()` skips ahead when this close to the end (default: 2s)
    pub near_end_ms: u64,
}

impl PlaybackConfig {
    pub fn idle_shutdown(&self) -> Duration {
        Duration::from_millis(self.idle_shutdown_ms)
    }

    pub fn fade_tick(&self) -> Duration {
        Duration::from_millis(self.fade_tick_ms)
    }

    pub fn server_died_delay(&self) -> Duration {
        Duration::from_millis(self.server_died_delay_ms)
    }

    pub fn near_end(&self) -> Duration {
        Duration::from_millis(self.near_end_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            idle_shutdown_ms: 60_000,
            fade_tick_ms: 10,
            fade_up_step: 0.01,
            fade_down_step: 0.05,
            duck_floor: 0.2,
            transient_attenuation_db: -8.0,
            max_open_retries: 10,
            max_history: 100,
            card_id: 0,
            server_died_delay_ms: 2000,
            near_end_ms: 2000,
        }
    }
}
