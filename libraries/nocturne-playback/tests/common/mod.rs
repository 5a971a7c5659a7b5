//! Shared fakes for the engine integration tests
//!
//! Every fake keeps its state behind `Arc<Mutex<..>>` so the test can keep
//! a handle after the engine takes ownership of the boxed trait object.

#![allow(dead_code)]

use nocturne_playback::{
    AudioFocusHost, CallMonitor, Clock, Collaborators, Library, LyricLine, LyricsSource,
    ManualClock, MediaPlayer, MemoryStore, PlaybackConfig, PlaybackEngine, PlaybackEvent,
    PlayerError, Shuffler, StateStore, StoreError, TrackId, TrackSnapshot,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TRACK_LENGTH: Duration = Duration::from_secs(180);

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

pub fn ids(values: &[u64]) -> Vec<TrackId> {
    values.iter().copied().map(TrackId).collect()
}

pub fn path_of(id: u64) -> PathBuf {
    PathBuf::from(format!("/music/{id}.mp3"))
}

pub fn snapshot(id: u64) -> TrackSnapshot {
    TrackSnapshot {
        id: TrackId(id),
        path: path_of(id),
        title: format!("Track {id}"),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        duration: TRACK_LENGTH,
        bookmark: Duration::ZERO,
        long_form: false,
    }
}

// ===== Media player =====

#[derive(Debug)]
pub struct PlayerState {
    pub source: Option<PathBuf>,
    pub playing: bool,
    pub position: Duration,
    pub duration: Duration,
    pub volume: f32,
    pub opened: Vec<PathBuf>,
    pub starts: usize,
    pub pauses: usize,
    pub stops: usize,
    pub releases: usize,
    pub recreates: usize,
    pub failing: HashSet<PathBuf>,
    pub durations: HashMap<PathBuf, Duration>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            source: None,
            playing: false,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            volume: 1.0,
            opened: Vec::new(),
            starts: 0,
            pauses: 0,
            stops: 0,
            releases: 0,
            recreates: 0,
            failing: HashSet::new(),
            durations: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePlayer {
    pub state: Arc<Mutex<PlayerState>>,
}

impl FakePlayer {
    pub fn state(&self) -> std::sync::MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, id: u64) {
        self.state().failing.insert(path_of(id));
    }

    pub fn set_position(&self, position: Duration) {
        self.state().position = position;
    }

    pub fn position(&self) -> Duration {
        self.state().position
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    /// Let `elapsed` of wall time pass for a playing source
    pub fn tick(&self, elapsed: Duration) {
        let mut state = self.state();
        if state.playing && state.source.is_some() {
            state.position = (state.position + elapsed).min(state.duration);
        }
    }
}

impl MediaPlayer for FakePlayer {
    fn set_source(&mut self, path: &Path) -> Result<(), PlayerError> {
        let mut state = self.state();
        state.opened.push(path.to_path_buf());
        if state.failing.contains(path) {
            state.source = None;
            return Err(PlayerError::SourceRejected(path.display().to_string()));
        }
        state.duration = state.durations.get(path).copied().unwrap_or(TRACK_LENGTH);
        state.source = Some(path.to_path_buf());
        state.position = Duration::ZERO;
        state.playing = false;
        Ok(())
    }

    fn start(&mut self) {
        let mut state = self.state();
        state.playing = true;
        state.starts += 1;
    }

    fn pause(&mut self) {
        let mut state = self.state();
        state.playing = false;
        state.pauses += 1;
    }

    fn stop(&mut self) {
        let mut state = self.state();
        state.playing = false;
        state.stops += 1;
    }

    fn release(&mut self) {
        let mut state = self.state();
        state.source = None;
        state.playing = false;
        state.releases += 1;
    }

    fn recreate(&mut self) {
        let mut state = self.state();
        state.source = None;
        state.playing = false;
        state.recreates += 1;
    }

    fn seek(&mut self, position: Duration) -> Duration {
        let mut state = self.state();
        state.position = position.min(state.duration);
        state.position
    }

    fn position(&self) -> Duration {
        self.state().position
    }

    fn duration(&self) -> Duration {
        self.state().duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.state().volume = volume;
    }

    fn is_initialized(&self) -> bool {
        self.state().source.is_some()
    }
}

// ===== Library =====

#[derive(Debug, Default)]
pub struct LibraryState {
    pub tracks: HashMap<TrackId, TrackSnapshot>,
    pub albums: HashMap<String, Vec<TrackId>>,
    pub favorites: HashSet<TrackId>,
    pub bookmark_writes: Vec<(TrackId, Duration)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeLibrary {
    pub state: Arc<Mutex<LibraryState>>,
}

impl FakeLibrary {
    pub fn with_tracks(values: &[u64]) -> Self {
        let library = Self::default();
        for &id in values {
            library.insert(snapshot(id));
        }
        library
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap()
    }

    pub fn insert(&self, track: TrackSnapshot) {
        self.state().tracks.insert(track.id, track);
    }

    pub fn add_album(&self, name: &str, values: &[u64]) {
        self.state().albums.insert(name.to_string(), ids(values));
    }

    pub fn bookmark(&self, id: u64) -> Duration {
        self.state()
            .tracks
            .get(&TrackId(id))
            .map(|track| track.bookmark)
            .unwrap_or_default()
    }

    pub fn bookmark_writes(&self) -> usize {
        self.state().bookmark_writes.len()
    }

    fn filtered(&self, members: Vec<TrackId>, filter: Option<&str>) -> Vec<TrackId> {
        let state = self.state();
        members
            .into_iter()
            .filter(|id| match (filter, state.tracks.get(id)) {
                (None, _) => true,
                (Some(text), Some(track)) => track.title.contains(text),
                (Some(_), None) => false,
            })
            .collect()
    }
}

impl Library for FakeLibrary {
    fn track(&self, id: TrackId) -> Option<TrackSnapshot> {
        self.state().tracks.get(&id).cloned()
    }

    fn album_tracks(&self, album: &str, filter: Option<&str>) -> Vec<TrackId> {
        let members = self.state().albums.get(album).cloned().unwrap_or_default();
        self.filtered(members, filter)
    }

    fn artist_tracks(&self, artist: &str, filter: Option<&str>) -> Vec<TrackId> {
        let mut members: Vec<TrackId> = self
            .state()
            .tracks
            .values()
            .filter(|track| track.artist == artist)
            .map(|track| track.id)
            .collect();
        members.sort();
        self.filtered(members, filter)
    }

    fn set_bookmark(&mut self, id: TrackId, bookmark: Duration) {
        let mut state = self.state();
        state.bookmark_writes.push((id, bookmark));
        if let Some(track) = state.tracks.get_mut(&id) {
            track.bookmark = bookmark;
        }
    }

    fn is_favorite(&self, id: TrackId) -> bool {
        self.state().favorites.contains(&id)
    }
}

// ===== Store =====

#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    pub inner: Arc<Mutex<MemoryStore>>,
    pub commits: Arc<AtomicUsize>,
}

impl SharedStore {
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get_string(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.inner.lock().unwrap().get_i64(key)
    }

    pub fn put_string(&self, key: &str, value: &str) {
        self.inner.lock().unwrap().put_string(key, value.to_string());
    }

    pub fn put_i64(&self, key: &str, value: i64) {
        self.inner.lock().unwrap().put_i64(key, value);
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl StateStore for SharedStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get_string(key)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.inner.lock().unwrap().get_i64(key)
    }

    fn put_string(&mut self, key: &str, value: String) {
        self.inner.lock().unwrap().put_string(key, value);
    }

    fn put_i64(&mut self, key: &str, value: i64) {
        self.inner.lock().unwrap().put_i64(key, value);
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ===== Focus, telephony, lyrics =====

#[derive(Debug, Clone, Default)]
pub struct FakeFocus {
    pub requests: Arc<AtomicUsize>,
    pub abandons: Arc<AtomicUsize>,
}

impl AudioFocusHost for FakeFocus {
    fn request_focus(&mut self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn abandon_focus(&mut self) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeCalls {
    pub active: Arc<AtomicBool>,
}

impl FakeCalls {
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl CallMonitor for FakeCalls {
    fn is_call_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeLyrics {
    pub lines: Arc<Mutex<HashMap<TrackId, Vec<LyricLine>>>>,
}

impl FakeLyrics {
    pub fn insert(&self, id: u64, lines: Vec<LyricLine>) {
        self.lines.lock().unwrap().insert(TrackId(id), lines);
    }
}

impl LyricsSource for FakeLyrics {
    fn lines(&self, track: &TrackSnapshot) -> Vec<LyricLine> {
        self.lines
            .lock()
            .unwrap()
            .get(&track.id)
            .cloned()
            .unwrap_or_default()
    }
}

// ===== Harness =====

/// Engine wired to fakes and a manual clock
pub struct Harness {
    pub engine: PlaybackEngine,
    pub player: FakePlayer,
    pub library: FakeLibrary,
    pub store: SharedStore,
    pub focus: FakeFocus,
    pub calls: FakeCalls,
    pub lyrics: FakeLyrics,
    pub clock: ManualClock,
}

impl Harness {
    /// Engine with a library holding `values`, default config
    pub fn new(values: &[u64]) -> Self {
        Self::build(
            PlaybackConfig::default(),
            FakeLibrary::with_tracks(values),
            SharedStore::default(),
            7,
        )
    }

    pub fn build(config: PlaybackConfig, library: FakeLibrary, store: SharedStore, seed: u64) -> Self {
        Self::build_with_player(config, library, store, FakePlayer::default(), seed)
    }

    pub fn build_with_player(
        config: PlaybackConfig,
        library: FakeLibrary,
        store: SharedStore,
        player: FakePlayer,
        seed: u64,
    ) -> Self {
        let focus = FakeFocus::default();
        let calls = FakeCalls::default();
        let lyrics = FakeLyrics::default();
        let clock = ManualClock::new();

        let collaborators = Collaborators::new(
            Box::new(player.clone()),
            Box::new(library.clone()),
            Box::new(store.clone()),
        )
        .with_focus(Box::new(focus.clone()))
        .with_calls(Box::new(calls.clone()))
        .with_lyrics(Box::new(lyrics.clone()))
        .with_clock(Arc::new(clock.clone()));

        let engine = PlaybackEngine::with_shuffler(config, collaborators, Shuffler::with_seed(seed));

        Self {
            engine,
            player,
            library,
            store,
            focus,
            calls,
            lyrics,
            clock,
        }
    }

    /// Open `values` at `start` without starting playback
    pub fn open(&mut self, values: &[u64], start: Option<usize>) {
        assert!(self.engine.open(ids(values), start));
    }

    /// Let time pass, firing timers as their deadlines come up
    pub fn advance(&mut self, by: Duration) {
        let target = self.clock.now() + by;
        while let Some(deadline) = self.engine.next_deadline() {
            if deadline > target {
                break;
            }
            let now = self.clock.now();
            if deadline > now {
                self.player.tick(deadline - now);
                self.clock.set(deadline);
            }
            self.engine.run_due_timers();
        }
        let now = self.clock.now();
        self.player.tick(target - now);
        self.clock.set(target);
    }

    pub fn events(&mut self) -> Vec<PlaybackEvent> {
        self.engine.drain_events()
    }

    pub fn current(&self) -> Option<u64> {
        self.engine.current_id().map(|id| id.0)
    }
}
