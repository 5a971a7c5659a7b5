//! Platform capabilities consumed by the engine
//!
//! The engine owns no audio output, no metadata database and no storage.
//! Each host (daemon, tests, an embedded target) supplies these traits.

use crate::error::{PlayerError, StoreError};
use crate::lyrics::LyricLine;
use crate::timer::{Clock, SystemClock};
use crate::types::{TrackId, TrackSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Opaque decode-and-render backend
///
/// Completion and error callbacks are not part of the trait: the host
/// delivers them to the engine (`on_completion`, `on_player_error`),
/// usually through the service channel.
pub trait MediaPlayer: Send {
    /// Prepare `path` for playback
    ///
    /// # Returns
    /// * `Ok(())` - Source opened, player initialized
    /// * `Err(PlayerError::SourceRejected)` - File missing or undecodable
    fn set_source(&mut self, path: &Path) -> Result<(), PlayerError>;

    fn start(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// Free the opened source; calling it twice is harmless
    fn release(&mut self);

    /// Tear down and rebuild the backend after it died
    fn recreate(&mut self);

    /// Seek and return the position actually reached
    fn seek(&mut self, position: Duration) -> Duration;

    fn position(&self) -> Duration;

    fn duration(&self) -> Duration;

    /// Linear output gain, 0.0 to 1.0
    fn set_volume(&mut self, volume: f32);

    /// Whether a source is currently opened
    fn is_initialized(&self) -> bool;
}

/// Track metadata lookup
pub trait Library: Send {
    /// Resolve a track reference, `None` if the library does not know it
    fn track(&self, id: TrackId) -> Option<TrackSnapshot>;

    /// Member tracks of an album, optionally filtered by title text
    fn album_tracks(&self, album: &str, filter: Option<&str>) -> Vec<TrackId>;

    /// Member tracks of an artist, optionally filtered by title text
    fn artist_tracks(&self, artist: &str, filter: Option<&str>) -> Vec<TrackId>;

    /// Write back a long-form resume point
    fn set_bookmark(&mut self, id: TrackId, bookmark: Duration);

    /// Favorites are allowed to recur while shuffling
    fn is_favorite(&self, _id: TrackId) -> bool {
        false
    }
}

/// Key-value storage that survives restarts
pub trait StateStore: Send {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_i64(&self, key: &str) -> Option<i64>;

    fn put_string(&mut self, key: &str, value: String);

    fn put_i64(&mut self, key: &str, value: i64);

    /// Flush pending writes
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// System audio focus
pub trait AudioFocusHost: Send {
    /// Returns `true` when focus was granted
    fn request_focus(&mut self) -> bool;

    fn abandon_focus(&mut self);
}

/// Telephony state
pub trait CallMonitor: Send {
    /// A call is ringing or off-hook
    fn is_call_active(&self) -> bool;
}

/// Timed lyrics for a track
pub trait LyricsSource: Send {
    /// Lines for `track`, empty when none exist
    fn lines(&self, track: &TrackSnapshot) -> Vec<LyricLine>;
}

/// A stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Integer(i64),
    Text(String),
}

/// [`StateStore`] kept in memory
///
/// Serializable so hosts can persist it as a whole (the daemon writes it
/// to a JSON file on commit).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    values: BTreeMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

impl StateStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(StoredValue::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(StoredValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    fn put_string(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), StoredValue::Text(value));
    }

    fn put_i64(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), StoredValue::Integer(value));
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Focus host that always grants focus
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFocusHost;

impl AudioFocusHost for NoFocusHost {
    fn request_focus(&mut self) -> bool {
        true
    }

    fn abandon_focus(&mut self) {}
}

/// Host without telephony
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelephony;

impl CallMonitor for NoTelephony {
    fn is_call_active(&self) -> bool {
        false
    }
}

/// Host without lyrics
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLyrics;

impl LyricsSource for NoLyrics {
    fn lines(&self, _track: &TrackSnapshot) -> Vec<LyricLine> {
        Vec::new()
    }
}

/// Everything the engine needs from its host
pub struct Collaborators {
    pub player: Box<dyn MediaPlayer>,
    pub library: Box<dyn Library>,
    pub store: Box<dyn StateStore>,
    pub focus: Box<dyn AudioFocusHost>,
    pub calls: Box<dyn CallMonitor>,
    pub lyrics: Box<dyn LyricsSource>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Required capabilities; the optional ones default to no-ops and the
    /// system clock
    pub fn new(
        player: Box<dyn MediaPlayer>,
        library: Box<dyn Library>,
        store: Box<dyn StateStore>,
    ) -> Self {
        Self {
            player,
            library,
            store,
            focus: Box::new(NoFocusHost),
            calls: Box::new(NoTelephony),
            lyrics: Box::new(NoLyrics),
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn with_focus(mut self, focus: Box<dyn AudioFocusHost>) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_calls(mut self, calls: Box<dyn CallMonitor>) -> Self {
        self.calls = calls;
        self
    }

    pub fn with_lyrics(mut self, lyrics: Box<dyn LyricsSource>) -> Self {
        self.lyrics = lyrics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
