//! Playback engine - transport state machine
//!
//! Owns the queue, the shuffle/repeat policy, focus and lyrics state, and
//! drives the host's [`MediaPlayer`]. One engine exists per process; hosts
//! serialize access to it (see [`crate::service`]), so every method here
//! runs with exclusive access.
//!
//! Deferred work is expressed as [`TimerKind`] deadlines. Hosts call
//! [`PlaybackEngine::run_due_timers`] once [`PlaybackEngine::next_deadline`]
//! has passed.

use crate::{
    error::{PlaybackError, PlayerError, Result},
    events::PlaybackEvent,
    focus::{AudioFocusArbiter, FocusAction, FocusChange},
    lyrics::LyricsScheduler,
    persist::{self, SaveRequest},
    queue::{EnqueueOutcome, QueueStore, Removal},
    shuffle::Shuffler,
    source::{AudioFocusHost, CallMonitor, Collaborators, Library, LyricsSource, MediaPlayer, StateStore},
    timer::{Clock, TimerKind, Timers},
    types::{
        CallState, EnqueueAction, FocusState, PlaybackConfig, PlaybackState, RepeatMode,
        ShuffleMode, TrackId, TrackSnapshot,
    },
    volume::Fader,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Bookmark changes smaller than this are not written back
const BOOKMARK_TOLERANCE: Duration = Duration::from_secs(10);

/// Positions this close to the start clear the bookmark
const BOOKMARK_HEAD: Duration = Duration::from_secs(15);

/// Positions this close to the end clear the bookmark
const BOOKMARK_TAIL: Duration = Duration::from_secs(10);

/// Long-form tracks resume this far before their bookmark
const BOOKMARK_REWIND: Duration = Duration::from_secs(5);

/// Point-in-time view of the engine for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub playing: bool,
    pub track: Option<TrackId>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub position_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub queue_position: Option<usize>,
    pub queue_length: usize,
    pub shuffle: ShuffleMode,
    pub repeat: RepeatMode,
    pub volume: f32,
}

/// Playback engine
pub struct PlaybackEngine {
    config: PlaybackConfig,

    // Host capabilities
    player: Box<dyn MediaPlayer>,
    library: Box<dyn Library>,
    store: Box<dyn StateStore>,
    focus_host: Box<dyn AudioFocusHost>,
    calls: Box<dyn CallMonitor>,
    lyrics_source: Box<dyn LyricsSource>,
    clock: Arc<dyn Clock>,

    queue: QueueStore,
    shuffler: Shuffler,
    fader: Fader,
    focus: AudioFocusArbiter,
    lyrics: LyricsScheduler,
    timers: Timers,

    state: PlaybackState,

    // "Supposed to be playing": survives track changes, drives PlayStateChanged
    playing: bool,

    // Snapshot of the opened track
    current: Option<TrackSnapshot>,

    // A source is set on the player and not yet released
    player_open: bool,

    // Offset to restore when a player released by the idle timeout reopens
    resume_at: Option<Duration>,

    shuffle_mode: ShuffleMode,
    repeat_mode: RepeatMode,

    // Consecutive failed opens in the current streak
    open_failures: u32,

    // Sleep timer ran out; the next advance pauses instead
    sleep_elapsed: bool,

    // Bound clients keep the engine from idling out
    clients: usize,

    // Event queue for notification bridges
    pending_events: Vec<PlaybackEvent>,
}

impl PlaybackEngine {
    /// Create an engine with an OS-seeded shuffler
    pub fn new(config: PlaybackConfig, collaborators: Collaborators) -> Self {
        Self::with_shuffler(config, collaborators, Shuffler::new())
    }

    /// Create an engine with a specific shuffler (seeded for reproducibility)
    pub fn with_shuffler(config: PlaybackConfig, collaborators: Collaborators, shuffler: Shuffler) -> Self {
        let Collaborators {
            player,
            library,
            store,
            focus,
            calls,
            lyrics,
            clock,
        } = collaborators;

        Self {
            queue: QueueStore::new(config.max_history),
            fader: Fader::new(config.fade_up_step, config.fade_down_step, config.duck_floor),
            focus: AudioFocusArbiter::new(config.transient_attenuation_db),
            config,
            player,
            library,
            store,
            focus_host: focus,
            calls,
            lyrics_source: lyrics,
            clock,
            shuffler,
            lyrics: LyricsScheduler::new(),
            timers: Timers::new(),
            state: PlaybackState::Idle,
            playing: false,
            current: None,
            player_open: false,
            resume_at: None,
            shuffle_mode: ShuffleMode::Off,
            repeat_mode: RepeatMode::Off,
            open_failures: 0,
            sleep_elapsed: false,
            clients: 0,
            pending_events: Vec::new(),
        }
    }

    // ===== Transport =====

    /// Start or resume playback of the current track
    pub fn play(&mut self) {
        if self.calls.is_call_active() {
            tracing::debug!("Call in progress, not starting playback");
            return;
        }

        if self.focus_host.request_focus() {
            self.focus.granted();
        }

        if !self.player_open && self.queue.current().is_some() {
            self.open_current(false);
            if let Some(offset) = self.resume_at.take() {
                if self.player_open && offset < self.player.duration() {
                    self.player.seek(offset);
                }
            }
        }
        if !self.player_open || !self.player.is_initialized() {
            return;
        }

        let duration = self.player.duration();
        let near_end = self.config.near_end();
        if self.repeat_mode != RepeatMode::Current
            && duration > near_end
            && self.player.position() >= duration - near_end
        {
            // Starting here would end immediately
            self.next(true);
            return;
        }

        self.player.start();
        self.timers.cancel(TimerKind::FadeDown);
        self.timers.schedule(TimerKind::FadeUp, self.clock.now(), Duration::ZERO);
        self.timers.cancel(TimerKind::IdleShutdown);

        self.state = PlaybackState::Playing;
        self.set_playing(true);
        self.resync_lyrics();
    }

    /// Pause on user request
    pub fn pause(&mut self) {
        self.focus.take_transient_pause();
        self.pause_with(PlaybackState::PausedUser);
    }

    /// Pause if playing, else start playing
    pub fn toggle_pause(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stop and release the player
    pub fn stop(&mut self) {
        self.save_bookmark_if_needed();
        self.stop_internal(true);
    }

    /// Seek within the current track
    ///
    /// Returns the position reached, or `None` when nothing is open.
    pub fn seek(&mut self, position: Duration) -> Option<Duration> {
        if !self.player_open || !self.player.is_initialized() {
            return None;
        }

        let target = position.min(self.player.duration());
        let reached = self.player.seek(target);
        self.resync_lyrics();
        self.emit_position_changed(reached);
        Some(reached)
    }

    /// Advance to the next track
    ///
    /// `force` wraps around even without repeat-all (user pressed next).
    pub fn next(&mut self, force: bool) {
        if self.sleep_elapsed {
            tracing::info!("Sleep timer elapsed, pausing instead of advancing");
            self.sleep_elapsed = false;
            self.timers.cancel(TimerKind::SleepTimer);
            self.pause();
            return;
        }

        if self.queue.is_empty() {
            return;
        }

        let Some(next) = self.next_position(force) else {
            tracing::debug!("End of queue reached");
            self.go_idle();
            return;
        };

        self.change_track(next);
    }

    /// Go back one track (or to the last history entry while shuffling)
    pub fn prev(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let target = if self.shuffle_mode == ShuffleMode::Normal {
            match self.queue.pop_history() {
                Some(position) => position,
                None => return,
            }
        } else {
            match self.queue.position() {
                Some(position) if position > 0 => position - 1,
                _ => self.queue.len() - 1,
            }
        };

        self.change_track(target);
    }

    /// Jump to a queue position and play it
    pub fn set_queue_position(&mut self, index: usize) -> Result<()> {
        if index >= self.queue.len() {
            return Err(PlaybackError::IndexOutOfBounds(index));
        }
        self.change_track(index);
        Ok(())
    }

    // ===== Modes =====

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        if mode == self.shuffle_mode && !self.queue.is_empty() {
            return;
        }

        let previous = self.shuffle_mode;
        self.shuffle_mode = mode;
        tracing::debug!(?previous, ?mode, "Shuffle mode changed");

        if (mode != ShuffleMode::Off || previous != ShuffleMode::Off)
            && self.repeat_mode == RepeatMode::Current
        {
            self.repeat_mode = RepeatMode::Off;
            self.emit_repeat_changed();
        }
        self.emit_shuffle_changed();
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        tracing::debug!(?mode, "Repeat mode changed");

        if mode == RepeatMode::Current && self.shuffle_mode != ShuffleMode::Off {
            self.shuffle_mode = ShuffleMode::Off;
            self.emit_shuffle_changed();
        }
        self.emit_repeat_changed();
    }

    /// Off → All → Current → Off
    pub fn cycle_repeat(&mut self) {
        let next = match self.repeat_mode {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::Current,
            RepeatMode::Current => RepeatMode::Off,
        };
        self.set_repeat_mode(next);
    }

    /// Off → Normal, Normal/Auto → Off
    pub fn toggle_shuffle(&mut self) {
        if self.shuffle_mode == ShuffleMode::Off {
            // Looping one track while shuffling makes no sense
            if self.repeat_mode == RepeatMode::Current {
                self.set_repeat_mode(RepeatMode::All);
            }
            self.set_shuffle_mode(ShuffleMode::Normal);
        } else {
            self.set_shuffle_mode(ShuffleMode::Off);
        }
    }

    // ===== Queue =====

    /// Replace the queue and open `start` (a shuffle pick when `None`)
    ///
    /// Keeps playing if playback was active. Returns `false` for an empty
    /// list or when no track in it could be opened.
    pub fn open(&mut self, list: Vec<TrackId>, start: Option<usize>) -> bool {
        if list.is_empty() {
            return false;
        }

        if self.shuffle_mode == ShuffleMode::Auto {
            self.shuffle_mode = ShuffleMode::Normal;
            self.emit_shuffle_changed();
        }

        let old_id = self.current_id();
        let new_list = self.queue.items() != list.as_slice();

        self.queue.open(list, start, &mut self.shuffler);
        if new_list {
            self.emit_queue_changed();
        }

        self.save_bookmark_if_needed();
        self.stop_internal(false);
        let opened = self.open_current(false);

        if opened && self.playing {
            self.play();
        }
        if old_id != self.current_id() {
            self.emit_meta_changed();
        }
        opened
    }

    /// Add tracks to the queue
    pub fn enqueue(&mut self, list: &[TrackId], action: EnqueueAction) {
        match self.queue.enqueue(list, action) {
            EnqueueOutcome::Unchanged => {}
            EnqueueOutcome::Queued => self.emit_queue_changed(),
            EnqueueOutcome::OpenAndPlay => {
                self.emit_queue_changed();
                self.save_bookmark_if_needed();
                self.stop_internal(false);
                if self.open_current(false) {
                    self.play();
                }
                self.emit_meta_changed();
            }
        }
    }

    /// Move a queue entry
    pub fn move_item(&mut self, from: usize, to: usize) {
        if self.queue.is_empty() {
            return;
        }
        self.queue.move_item(from, to);
        self.emit_queue_changed();
    }

    /// Remove the inclusive range `[first, last]`, returning the count removed
    pub fn remove_range(&mut self, first: usize, last: usize) -> usize {
        let removal = self.queue.remove_range(first, last);
        self.after_removal(removal)
    }

    /// Remove every occurrence of a track, returning the count removed
    pub fn remove_track(&mut self, id: TrackId) -> usize {
        let removal = self.queue.remove_id(id);
        self.after_removal(removal)
    }

    /// Queue an album (optionally filtered) and start playing it
    pub fn open_album(&mut self, album: &str, filter: Option<&str>) -> bool {
        let tracks = self.library.album_tracks(album, filter);
        self.open_and_play(tracks)
    }

    /// Queue an artist (optionally filtered) and start playing it
    pub fn open_artist(&mut self, artist: &str, filter: Option<&str>) -> bool {
        let tracks = self.library.artist_tracks(artist, filter);
        self.open_and_play(tracks)
    }

    fn open_and_play(&mut self, tracks: Vec<TrackId>) -> bool {
        let start = if self.shuffle_mode == ShuffleMode::Normal {
            None
        } else {
            Some(0)
        };
        if !self.open(tracks, start) {
            return false;
        }
        self.play();
        true
    }

    fn after_removal(&mut self, removal: Removal) -> usize {
        if removal.removed == 0 {
            return 0;
        }

        if removal.current_removed {
            if self.queue.is_empty() {
                self.stop_internal(true);
            } else {
                let was_playing = self.playing;
                self.stop_internal(false);
                if self.open_current(false) && was_playing {
                    self.play();
                }
            }
            self.emit_meta_changed();
        }

        self.emit_queue_changed();
        removal.removed
    }

    // ===== Host callbacks =====

    /// The player reached the end of the track
    pub fn on_completion(&mut self) {
        if self.repeat_mode == RepeatMode::Current {
            self.seek(Duration::ZERO);
            self.play();
        } else {
            self.next(false);
        }
    }

    /// The player reported an error
    pub fn on_player_error(&mut self, error: PlayerError) {
        match error {
            PlayerError::ServerDied => {
                tracing::warn!("Media player died, recreating");
                self.player_open = false;
                self.player.recreate();
                self.timers.schedule(
                    TimerKind::ServerDiedRecovery,
                    self.clock.now(),
                    self.config.server_died_delay(),
                );
            }
            other => {
                tracing::warn!(error = %other, "Playback error, skipping track");
                self.next(false);
            }
        }
    }

    /// The host audio stack changed our focus
    pub fn on_focus_change(&mut self, change: FocusChange) {
        let action = self.focus.on_change(change, self.playing);
        tracing::debug!(?change, ?action, "Audio focus changed");

        match action {
            FocusAction::Pause => self.pause_with(PlaybackState::PausedUser),
            FocusAction::FadeDown => {
                self.timers.cancel(TimerKind::FadeUp);
                self.timers.schedule(TimerKind::FadeDown, self.clock.now(), Duration::ZERO);
            }
            FocusAction::Attenuate(gain) => {
                self.fader.set_level(gain);
                self.player.set_volume(gain);
            }
            FocusAction::Resume => {
                self.fader.set_level(0.0);
                self.player.set_volume(0.0);
                self.play();
            }
            FocusAction::FadeUp => {
                self.timers.cancel(TimerKind::FadeDown);
                self.timers.schedule(TimerKind::FadeUp, self.clock.now(), Duration::ZERO);
            }
            FocusAction::Nothing => {}
        }
    }

    /// Telephony state changed
    pub fn on_call_state(&mut self, call: CallState) {
        match call {
            CallState::Ringing | CallState::OffHook => {
                if self.playing {
                    tracing::info!(?call, "Pausing for call");
                    self.focus.mark_transient_pause();
                    self.pause_with(PlaybackState::PausedFocusTransient);
                }
            }
            CallState::Idle => {
                if self.focus.take_transient_pause() {
                    tracing::info!("Call ended, resuming");
                    self.fader.set_level(0.0);
                    self.player.set_volume(0.0);
                    self.play();
                }
            }
        }
    }

    /// Arm (or with `None`, disarm) the sleep timer
    pub fn set_sleep_timer(&mut self, after: Option<Duration>) {
        self.sleep_elapsed = false;
        match after {
            Some(delay) => {
                self.timers.schedule(TimerKind::SleepTimer, self.clock.now(), delay);
            }
            None => self.timers.cancel(TimerKind::SleepTimer),
        }
    }

    /// A client connected
    pub fn bind_client(&mut self) {
        self.clients += 1;
        self.timers.cancel(TimerKind::IdleShutdown);
    }

    /// A client went away
    pub fn unbind_client(&mut self) {
        self.clients = self.clients.saturating_sub(1);
        self.save_queue(true);
        self.schedule_idle_shutdown();
    }

    /// Any command arrived; restart the idle debounce
    pub fn note_activity(&mut self) {
        self.schedule_idle_shutdown();
    }

    /// Persist, release the player and give up focus
    pub fn shutdown(&mut self) {
        self.save_bookmark_if_needed();
        self.save_queue(true);
        if self.playing {
            self.player.pause();
        }
        self.state = PlaybackState::Idle;
        self.playing = false;
        self.release_player();
        self.focus_host.abandon_focus();
        self.focus.abandoned();
        for kind in [
            TimerKind::FadeUp,
            TimerKind::FadeDown,
            TimerKind::IdleShutdown,
            TimerKind::SleepTimer,
            TimerKind::LyricsAdvance,
            TimerKind::ServerDiedRecovery,
        ] {
            self.timers.cancel(kind);
        }
    }

    // ===== Timers =====

    /// Earliest pending deadline on the engine clock
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// How long until the earliest pending deadline
    pub fn time_to_next_deadline(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.timers
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(now))
    }

    pub fn is_timer_pending(&self, kind: TimerKind) -> bool {
        self.timers.is_pending(kind)
    }

    /// Fire every timer that is due
    pub fn run_due_timers(&mut self) {
        let now = self.clock.now();
        for kind in self.timers.take_due(now) {
            self.on_timer(kind);
        }
    }

    fn on_timer(&mut self, kind: TimerKind) {
        let now = self.clock.now();
        match kind {
            TimerKind::FadeUp => {
                let more = self.fader.step_up();
                self.player.set_volume(self.fader.level());
                if more {
                    self.timers.schedule(TimerKind::FadeUp, now, self.config.fade_tick());
                }
            }
            TimerKind::FadeDown => {
                let more = self.fader.step_down();
                self.player.set_volume(self.fader.level());
                if more {
                    self.timers.schedule(TimerKind::FadeDown, now, self.config.fade_tick());
                }
            }
            TimerKind::IdleShutdown => self.idle_shutdown(),
            TimerKind::SleepTimer => {
                tracing::info!("Sleep timer elapsed");
                self.sleep_elapsed = true;
            }
            TimerKind::LyricsAdvance => {
                let delay = self.lyrics.advance(self.player.position());
                self.emit_lyric_line_changed();
                if let Some(delay) = delay {
                    self.timers.schedule(TimerKind::LyricsAdvance, now, delay);
                }
            }
            TimerKind::ServerDiedRecovery => {
                tracing::info!("Reopening after media player restart");
                if self.open_current(true) && self.playing {
                    self.play();
                }
            }
        }
    }

    fn schedule_idle_shutdown(&mut self) {
        self.timers.cancel(TimerKind::IdleShutdown);
        if self.is_idle() {
            self.timers.schedule(
                TimerKind::IdleShutdown,
                self.clock.now(),
                self.config.idle_shutdown(),
            );
        }
    }

    fn is_idle(&self) -> bool {
        self.clients == 0
            && !self.playing
            && !self.focus.paused_by_transient_loss()
            && !self.timers.is_pending(TimerKind::ServerDiedRecovery)
    }

    fn idle_shutdown(&mut self) {
        if !self.is_idle() {
            return;
        }
        tracing::info!("Idle timeout, releasing resources");
        self.save_queue(true);
        self.resume_at = self.position();
        self.release_player();
        self.state = PlaybackState::Idle;
        self.lyrics.suspend();
        self.focus_host.abandon_focus();
        self.focus.abandoned();
        self.pending_events.push(PlaybackEvent::ServiceIdle);
    }

    // ===== Persistence =====

    /// Write the current state to the store
    pub fn save_queue(&mut self, full: bool) {
        let seek = if self.player_open {
            self.player.position()
        } else {
            Duration::ZERO
        };
        let request = SaveRequest {
            queue: &self.queue,
            card_id: self.config.card_id,
            seek,
            repeat: self.repeat_mode,
            shuffle: self.shuffle_mode,
        };
        if let Err(e) = persist::save(self.store.as_mut(), &request, full) {
            tracing::warn!(error = %e, "Failed to save queue");
        }
    }

    /// Restore the queue saved by a previous run
    ///
    /// The saved track is opened quietly. Returns `false` (leaving the queue
    /// empty) when nothing usable was saved or the track no longer opens.
    pub fn reload_queue(&mut self) -> bool {
        let Some(saved) = persist::load(self.store.as_ref(), self.config.card_id) else {
            return false;
        };

        self.repeat_mode = saved.repeat;
        self.shuffle_mode = saved.shuffle;
        self.queue.open(saved.items, Some(saved.position), &mut self.shuffler);
        self.queue.set_history(saved.history);

        // A restored track that fails to open is not retried
        self.open_failures = self.config.max_open_retries;
        self.open_current(true);

        if !self.player_open {
            tracing::warn!("Saved track no longer opens, discarding queue");
            self.queue.clear();
            return false;
        }

        if saved.seek < self.player.duration() {
            self.player.seek(saved.seek);
        }
        tracing::info!(
            length = self.queue.len(),
            position = ?self.queue.position(),
            "Restored saved queue"
        );
        true
    }

    // ===== Accessors =====

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn queue(&self) -> &[TrackId] {
        self.queue.items()
    }

    pub fn queue_position(&self) -> Option<usize> {
        self.queue.position()
    }

    pub fn history(&self) -> &[usize] {
        self.queue.history()
    }

    pub fn current_track(&self) -> Option<&TrackSnapshot> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<TrackId> {
        self.current.as_ref().map(|track| track.id)
    }

    /// Playback offset, `None` when nothing is open
    pub fn position(&self) -> Option<Duration> {
        self.player_open.then(|| self.player.position())
    }

    /// Track length, `None` when nothing is open
    pub fn duration(&self) -> Option<Duration> {
        self.player_open.then(|| self.player.duration())
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn focus_state(&self) -> FocusState {
        self.focus.state()
    }

    /// Current output gain
    pub fn volume(&self) -> f32 {
        self.fader.level()
    }

    pub fn lyrics(&self) -> &LyricsScheduler {
        &self.lyrics
    }

    pub fn clients(&self) -> usize {
        self.clients
    }

    pub fn status(&self) -> PlaybackStatus {
        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        PlaybackStatus {
            state: self.state,
            playing: self.playing,
            track: self.current_id(),
            title: self.current.as_ref().map(|t| t.title.clone()),
            artist: self.current.as_ref().map(|t| t.artist.clone()),
            position_ms: self.position().map(millis),
            duration_ms: self.duration().map(millis),
            queue_position: self.queue.position(),
            queue_length: self.queue.len(),
            shuffle: self.shuffle_mode,
            repeat: self.repeat_mode,
            volume: self.fader.level(),
        }
    }

    // ===== Internals =====

    fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.emit_play_state_changed();
        }
    }

    fn pause_with(&mut self, state: PlaybackState) {
        self.timers.cancel(TimerKind::FadeUp);
        if !self.playing {
            return;
        }

        self.player.pause();
        self.save_bookmark_if_needed();
        self.state = state;
        self.lyrics.suspend();
        self.timers.cancel(TimerKind::LyricsAdvance);
        self.set_playing(false);
        self.schedule_idle_shutdown();
    }

    /// Nothing left to play: stay paused on the current track
    fn go_idle(&mut self) {
        if self.playing && self.player_open {
            self.player.pause();
        }
        self.timers.cancel(TimerKind::FadeUp);
        self.timers.cancel(TimerKind::LyricsAdvance);
        self.lyrics.suspend();
        self.state = if self.player_open {
            PlaybackState::PausedUser
        } else {
            PlaybackState::Idle
        };
        self.set_playing(false);
        self.schedule_idle_shutdown();
    }

    /// Stop the player and drop the open track
    ///
    /// With `clear_playing` the engine also leaves the playing state; track
    /// changes pass `false` so the play flag survives the switch.
    fn stop_internal(&mut self, clear_playing: bool) {
        if self.player_open && self.player.is_initialized() {
            self.player.stop();
        }
        self.release_player();
        self.resume_at = None;
        self.current = None;
        self.lyrics.clear();
        self.timers.cancel(TimerKind::LyricsAdvance);
        self.state = PlaybackState::Idle;

        if clear_playing {
            self.timers.cancel(TimerKind::FadeUp);
            self.set_playing(false);
            self.schedule_idle_shutdown();
        }
    }

    fn release_player(&mut self) {
        if self.player_open {
            tracing::debug!("Releasing media player");
            self.player.release();
            self.player_open = false;
        }
    }

    /// Leave the current track for queue position `target` and play it
    fn change_track(&mut self, target: usize) {
        self.save_bookmark_if_needed();
        self.stop_internal(false);
        if !self.queue.set_position(target) {
            return;
        }
        // A failed open has already reported and gone idle
        if self.open_current(false) {
            self.play();
        }
        self.emit_meta_changed();
    }

    fn next_position(&mut self, force: bool) -> Option<usize> {
        let len = self.queue.len();
        if len == 0 {
            return None;
        }

        if self.shuffle_mode == ShuffleMode::Normal {
            if let Some(position) = self.queue.position() {
                self.queue.push_history(position);
            }

            let mut unplayed = self.queue.unplayed();
            if unplayed.is_empty() {
                if self.repeat_mode == RepeatMode::All || force {
                    unplayed = (0..len).collect();
                } else {
                    return None;
                }
            }

            let queue = &self.queue;
            let library = &self.library;
            let pick = self.shuffler.pick(
                unplayed.len(),
                |i| queue.history().contains(&unplayed[i]),
                |i| {
                    queue
                        .get(unplayed[i])
                        .is_some_and(|id| library.is_favorite(id))
                },
            )?;
            return Some(unplayed[pick]);
        }

        match self.queue.position() {
            Some(position) if position + 1 < len => Some(position + 1),
            None => Some(0),
            Some(_) if self.repeat_mode == RepeatMode::All || force => Some(0),
            Some(_) => None,
        }
    }

    /// Open the track at the current position
    ///
    /// A track that fails to open is skipped, up to `max_open_retries`
    /// times in a row. When the streak is exhausted the failure is reported
    /// once (unless `quiet`) and the engine goes idle. Callers must not
    /// `play()` after a `false` return, which would start another streak.
    fn open_current(&mut self, quiet: bool) -> bool {
        loop {
            let Some(id) = self.queue.current() else {
                return false;
            };

            match self.open_track(id) {
                Ok(track) => {
                    tracing::info!(track = %id, title = %track.title, "Opened track");
                    self.open_failures = 0;
                    self.lyrics.load(self.lyrics_source.lines(&track));
                    self.current = Some(track);
                    if !self.playing {
                        self.state = PlaybackState::Open;
                    }
                    return true;
                }
                Err(e) => {
                    tracing::warn!(track = %id, error = %e, "Failed to open track");
                    self.open_failures += 1;

                    if self.open_failures <= self.config.max_open_retries && self.queue.len() > 1 {
                        if let Some(next) = self.next_position(false) {
                            self.queue.set_position(next);
                            continue;
                        }
                    }

                    self.open_failures = 0;
                    if !quiet {
                        self.pending_events
                            .push(PlaybackEvent::PlaybackFailed { track: Some(id) });
                    }
                    self.go_idle();
                    return false;
                }
            }
        }
    }

    fn open_track(&mut self, id: TrackId) -> Result<TrackSnapshot> {
        let track = self
            .library
            .track(id)
            .ok_or(PlaybackError::UnknownTrack(id))?;
        self.player.set_source(&track.path)?;
        self.player_open = true;

        if track.long_form && track.bookmark > Duration::ZERO {
            self.player.seek(track.bookmark.saturating_sub(BOOKMARK_REWIND));
        }
        Ok(track)
    }

    /// Store the resume point of the closing long-form track
    fn save_bookmark_if_needed(&mut self) {
        if !self.player_open {
            return;
        }
        let Some(track) = self.current.as_mut() else {
            return;
        };
        if !track.long_form {
            return;
        }

        let position = self.player.position();
        let delta = if position > track.bookmark {
            position - track.bookmark
        } else {
            track.bookmark - position
        };
        if delta < BOOKMARK_TOLERANCE {
            return;
        }

        let duration = self.player.duration();
        let bookmark = if position < BOOKMARK_HEAD || position + BOOKMARK_TAIL > duration {
            Duration::ZERO
        } else {
            position
        };

        tracing::debug!(track = %track.id, bookmark_ms = bookmark.as_millis(), "Saving bookmark");
        track.bookmark = bookmark;
        self.library.set_bookmark(track.id, bookmark);
    }

    fn resync_lyrics(&mut self) {
        let before = self.lyrics.active();
        let position = if self.player_open {
            self.player.position()
        } else {
            Duration::ZERO
        };
        let delay = self.lyrics.sync(position);

        if self.lyrics.active() != before {
            self.emit_lyric_line_changed();
        }

        match delay {
            Some(delay) if self.playing => {
                self.timers.schedule(TimerKind::LyricsAdvance, self.clock.now(), delay);
            }
            _ => {
                self.timers.cancel(TimerKind::LyricsAdvance);
                if !self.playing {
                    self.lyrics.suspend();
                }
            }
        }
    }

    // ===== Events =====

    /// Drain all pending events
    ///
    /// Returns all events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending_events.is_empty()
    }

    /// Queue a change notification and save opportunistically
    fn notify(&mut self, event: PlaybackEvent) {
        let full = matches!(event, PlaybackEvent::QueueChanged { .. });
        tracing::trace!(event = event.name(), "Playback event");
        self.pending_events.push(event);
        self.save_queue(full);
    }

    fn emit_queue_changed(&mut self) {
        self.notify(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
        });
    }

    fn emit_meta_changed(&mut self) {
        self.notify(PlaybackEvent::MetaChanged {
            track: self.current_id(),
        });
    }

    fn emit_play_state_changed(&mut self) {
        self.notify(PlaybackEvent::PlayStateChanged {
            playing: self.playing,
        });
    }

    fn emit_shuffle_changed(&mut self) {
        self.notify(PlaybackEvent::ShuffleChanged {
            mode: self.shuffle_mode,
        });
    }

    fn emit_repeat_changed(&mut self) {
        self.notify(PlaybackEvent::RepeatChanged {
            mode: self.repeat_mode,
        });
    }

    fn emit_position_changed(&mut self, position: Duration) {
        self.pending_events.push(PlaybackEvent::PositionChanged {
            position_ms: u64::try_from(position.as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn emit_lyric_line_changed(&mut self) {
        let index = self.lyrics.active();
        let text = self.lyrics.active_line().map(|line| line.text.clone());
        self.pending_events
            .push(PlaybackEvent::LyricLineChanged { index, text });
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state)
            .field("playing", &self.playing)
            .field("queue", &self.queue)
            .field("shuffle_mode", &self.shuffle_mode)
            .field("repeat_mode", &self.repeat_mode)
            .finish_non_exhaustive()
    }
}
