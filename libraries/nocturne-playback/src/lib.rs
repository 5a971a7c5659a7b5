//! Nocturne - Playback Engine
//!
//! Platform-agnostic play queue and transport state machine for Nocturne.
//!
//! This crate provides:
//! - Play queue with cursor and shuffle history ([`QueueStore`])
//! - Compact reverse-hex encoding of the saved queue ([`codec`])
//! - Non-repeating shuffle picks with favorite bias ([`Shuffler`])
//! - Transport state machine: play/pause/stop/seek/next/prev, repeat and
//!   shuffle policy, open-failure retries, long-form bookmarks
//!   ([`PlaybackEngine`])
//! - Audio focus arbitration with volume ramps ([`AudioFocusArbiter`])
//! - Lyric line scheduling against playback position ([`LyricsScheduler`])
//! - A worker-thread front end serializing every command source
//!   ([`PlaybackService`])
//!
//! # Architecture
//!
//! `nocturne-playback` owns no audio output, metadata database or storage.
//! Hosts provide them through the traits in [`source`]: [`MediaPlayer`],
//! [`Library`], [`StateStore`], plus optional focus, telephony and lyrics
//! capabilities. Time comes from a [`Clock`], so tests drive timers by hand.
//!
//! # Example: Driving the engine
//!
//! ```rust,no_run
//! use nocturne_playback::{
//!     Collaborators, MemoryStore, PlaybackConfig, PlaybackEngine, TrackId,
//! };
//! # fn host() -> (Box<dyn nocturne_playback::MediaPlayer>, Box<dyn nocturne_playback::Library>) { unimplemented!() }
//!
//! let (player, library) = host();
//! let collaborators = Collaborators::new(player, library, Box::new(MemoryStore::new()));
//! let mut engine = PlaybackEngine::new(PlaybackConfig::default(), collaborators);
//!
//! engine.open(vec![TrackId(10), TrackId(20), TrackId(30)], Some(0));
//! engine.play();
//! engine.next(false);
//!
//! for event in engine.drain_events() {
//!     println!("{}", event.name());
//! }
//! ```
//!
//! # Example: Running as a service
//!
//! ```rust,no_run
//! use nocturne_playback::{service, Command, PlaybackEngine, PlaybackService};
//! # fn engine() -> PlaybackEngine { unimplemented!() }
//!
//! let (tx, rx) = service::channel();
//! let service = PlaybackService::start(engine(), tx, rx).unwrap();
//! let events = service.subscribe(64);
//!
//! service.command("togglepause".parse::<Command>().unwrap()).unwrap();
//! service.flush().unwrap();
//! while let Ok(event) = events.try_recv() {
//!     println!("{event:?}");
//! }
//! ```

pub mod codec;
mod engine;
mod error;
pub mod events;
pub mod focus;
pub mod lyrics;
pub mod persist;
mod queue;
pub mod service;
mod shuffle;
pub mod source;
pub mod timer;
pub mod types;
mod volume;

// Public exports
pub use engine::{PlaybackEngine, PlaybackStatus};
pub use error::{PlaybackError, PlayerError, Result, StoreError};
pub use events::PlaybackEvent;
pub use focus::{AudioFocusArbiter, FocusAction, FocusChange};
pub use lyrics::{parse_lrc, LrcFileSource, LyricLine, LyricsScheduler};
pub use queue::{EnqueueOutcome, QueueStore, Removal};
pub use service::{Command, PlaybackService, ServiceMessage};
pub use shuffle::Shuffler;
pub use source::{
    AudioFocusHost, CallMonitor, Collaborators, Library, LyricsSource, MediaPlayer, MemoryStore,
    StateStore,
};
pub use timer::{Clock, ManualClock, SystemClock, TimerKind};
pub use types::{
    CallState, EnqueueAction, FocusState, PlaybackConfig, PlaybackState, RepeatMode, ShuffleMode,
    TrackId, TrackSnapshot,
};
pub use volume::{db_to_gain, Fader};
