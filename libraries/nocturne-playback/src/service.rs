//! Threaded front end for the engine
//!
//! Every command source (IPC clients, media buttons, player callbacks, OS
//! notifications) posts a [`ServiceMessage`] into one channel. A single
//! worker thread takes the engine lock, applies the message, fires due
//! timers and fans the resulting events out to subscribers, so commands
//! and timers never interleave.

use crate::{
    engine::{PlaybackEngine, PlaybackStatus},
    error::{PlaybackError, PlayerError, Result},
    events::PlaybackEvent,
    focus::FocusChange,
    types::{CallState, EnqueueAction, RepeatMode, ShuffleMode, TrackId},
};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Named transport commands accepted from remote controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    TogglePause,
    Pause,
    Play,
    Stop,
    CycleRepeat,
    ToggleShuffle,
    /// Seek to an absolute offset
    Seek(Duration),
}

impl Command {
    /// Run the command against the engine
    pub fn apply(self, engine: &mut PlaybackEngine) {
        match self {
            Self::Next => engine.next(true),
            Self::Previous => engine.prev(),
            Self::TogglePause => engine.toggle_pause(),
            Self::Pause => engine.pause(),
            Self::Play => engine.play(),
            Self::Stop => engine.stop(),
            Self::CycleRepeat => engine.cycle_repeat(),
            Self::ToggleShuffle => engine.toggle_shuffle(),
            Self::Seek(position) => {
                engine.seek(position);
            }
        }
    }
}

impl FromStr for Command {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();

        let command = match (name.as_str(), argument) {
            ("next", None) => Self::Next,
            ("previous" | "prev", None) => Self::Previous,
            ("togglepause", None) => Self::TogglePause,
            ("pause", None) => Self::Pause,
            ("play", None) => Self::Play,
            ("stop", None) => Self::Stop,
            ("cyclerepeat", None) => Self::CycleRepeat,
            ("toggleshuffle", None) => Self::ToggleShuffle,
            ("seek", Some(ms)) => ms
                .parse()
                .map(|ms| Self::Seek(Duration::from_millis(ms)))
                .map_err(|_| PlaybackError::UnknownCommand(s.trim().to_string()))?,
            _ => return Err(PlaybackError::UnknownCommand(s.trim().to_string())),
        };

        if words.next().is_some() {
            return Err(PlaybackError::UnknownCommand(s.trim().to_string()));
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => f.write_str("next"),
            Self::Previous => f.write_str("previous"),
            Self::TogglePause => f.write_str("togglepause"),
            Self::Pause => f.write_str("pause"),
            Self::Play => f.write_str("play"),
            Self::Stop => f.write_str("stop"),
            Self::CycleRepeat => f.write_str("cyclerepeat"),
            Self::ToggleShuffle => f.write_str("toggleshuffle"),
            Self::Seek(position) => write!(f, "seek {}", position.as_millis()),
        }
    }
}

/// Everything the worker thread can be asked to do
#[derive(Debug)]
pub enum ServiceMessage {
    Command(Command),
    Open {
        tracks: Vec<TrackId>,
        start: Option<usize>,
    },
    Enqueue {
        tracks: Vec<TrackId>,
        action: EnqueueAction,
    },
    OpenAlbum {
        album: String,
        filter: Option<String>,
    },
    OpenArtist {
        artist: String,
        filter: Option<String>,
    },
    SetQueuePosition(usize),
    MoveItem {
        from: usize,
        to: usize,
    },
    RemoveRange {
        first: usize,
        last: usize,
    },
    RemoveTrack(TrackId),
    SetShuffle(ShuffleMode),
    SetRepeat(RepeatMode),
    SleepTimer(Option<Duration>),

    // Player callbacks
    PlayerCompleted,
    PlayerFailed(PlayerError),

    // OS notifications
    FocusChanged(FocusChange),
    CallStateChanged(CallState),

    // Client lifetime
    Bind,
    Unbind,

    /// Replies once every earlier message has been handled
    Barrier(Sender<()>),

    Shutdown,
}

/// Create the service channel
///
/// Made separately from [`PlaybackService::start`] so collaborators that
/// report back (the media player) can hold a sender before the engine
/// exists.
pub fn channel() -> (Sender<ServiceMessage>, Receiver<ServiceMessage>) {
    unbounded()
}

type Subscribers = Arc<Mutex<Vec<Sender<PlaybackEvent>>>>;

/// Running engine plus its worker thread
pub struct PlaybackService {
    engine: Arc<Mutex<PlaybackEngine>>,
    sender: Sender<ServiceMessage>,
    subscribers: Subscribers,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackService {
    /// Spawn the worker thread
    ///
    /// `sender` and `receiver` must come from the same [`channel`].
    pub fn start(
        engine: PlaybackEngine,
        sender: Sender<ServiceMessage>,
        receiver: Receiver<ServiceMessage>,
    ) -> Result<Self> {
        let engine = Arc::new(Mutex::new(engine));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let engine = Arc::clone(&engine);
            let subscribers = Arc::clone(&subscribers);
            thread::Builder::new()
                .name("nocturne-playback".into())
                .spawn(move || run_worker(&engine, &receiver, &subscribers))?
        };

        tracing::info!("Playback service started");
        Ok(Self {
            engine,
            sender,
            subscribers,
            worker: Some(worker),
        })
    }

    /// Another handle for posting messages
    pub fn sender(&self) -> Sender<ServiceMessage> {
        self.sender.clone()
    }

    /// Post a message without waiting for it
    pub fn send(&self, message: ServiceMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| PlaybackError::ServiceStopped)
    }

    pub fn command(&self, command: Command) -> Result<()> {
        self.send(ServiceMessage::Command(command))
    }

    /// Wait until every message posted so far has been handled
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.send(ServiceMessage::Barrier(tx))?;
        rx.recv().map_err(|_| PlaybackError::ServiceStopped)
    }

    /// Receive future events; a subscriber that falls `capacity` events
    /// behind is dropped
    pub fn subscribe(&self, capacity: usize) -> Receiver<PlaybackEvent> {
        let (tx, rx) = bounded(capacity.max(1));
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Read engine state under the lock
    pub fn query<R>(&self, f: impl FnOnce(&PlaybackEngine) -> R) -> R {
        f(&*lock(&self.engine))
    }

    pub fn status(&self) -> PlaybackStatus {
        self.query(PlaybackEngine::status)
    }

    /// Stop the worker, persisting state
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.sender.send(ServiceMessage::Shutdown);
            if worker.join().is_err() {
                tracing::error!("Playback worker panicked");
            }
            tracing::info!("Playback service stopped");
        }
    }
}

impl Drop for PlaybackService {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(
    engine: &Mutex<PlaybackEngine>,
    receiver: &Receiver<ServiceMessage>,
    subscribers: &Mutex<Vec<Sender<PlaybackEvent>>>,
) {
    loop {
        let timeout = lock(engine).time_to_next_deadline();
        let message = match timeout {
            Some(timeout) => match receiver.recv_timeout(timeout) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match receiver.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };

        let mut reply = None;
        let mut stopping = false;
        let events = {
            let mut engine = lock(engine);
            match message {
                Some(ServiceMessage::Shutdown) => {
                    engine.shutdown();
                    stopping = true;
                }
                Some(ServiceMessage::Barrier(tx)) => reply = Some(tx),
                Some(message) => handle(&mut engine, message),
                None => {}
            }
            if !stopping {
                engine.run_due_timers();
            }
            engine.drain_events()
        };

        broadcast(subscribers, events);
        if let Some(reply) = reply {
            let _ = reply.send(());
        }
        if stopping {
            break;
        }
    }
    tracing::debug!("Playback worker exiting");
}

fn handle(engine: &mut PlaybackEngine, message: ServiceMessage) {
    tracing::trace!(?message, "Handling service message");
    let mut activity = true;

    match message {
        ServiceMessage::Command(command) => command.apply(engine),
        ServiceMessage::Open { tracks, start } => {
            if engine.open(tracks, start) {
                engine.play();
            }
        }
        ServiceMessage::Enqueue { tracks, action } => engine.enqueue(&tracks, action),
        ServiceMessage::OpenAlbum { album, filter } => {
            if !engine.open_album(&album, filter.as_deref()) {
                tracing::warn!(album = %album, "No tracks to open for album");
            }
        }
        ServiceMessage::OpenArtist { artist, filter } => {
            if !engine.open_artist(&artist, filter.as_deref()) {
                tracing::warn!(artist = %artist, "No tracks to open for artist");
            }
        }
        ServiceMessage::SetQueuePosition(index) => {
            if let Err(e) = engine.set_queue_position(index) {
                tracing::warn!(error = %e, "Ignoring queue jump");
            }
        }
        ServiceMessage::MoveItem { from, to } => engine.move_item(from, to),
        ServiceMessage::RemoveRange { first, last } => {
            engine.remove_range(first, last);
        }
        ServiceMessage::RemoveTrack(id) => {
            engine.remove_track(id);
        }
        ServiceMessage::SetShuffle(mode) => engine.set_shuffle_mode(mode),
        ServiceMessage::SetRepeat(mode) => engine.set_repeat_mode(mode),
        ServiceMessage::SleepTimer(after) => engine.set_sleep_timer(after),
        ServiceMessage::PlayerCompleted => {
            activity = false;
            engine.on_completion();
        }
        ServiceMessage::PlayerFailed(error) => {
            activity = false;
            engine.on_player_error(error);
        }
        ServiceMessage::FocusChanged(change) => {
            activity = false;
            engine.on_focus_change(change);
        }
        ServiceMessage::CallStateChanged(state) => {
            activity = false;
            engine.on_call_state(state);
        }
        ServiceMessage::Bind => engine.bind_client(),
        ServiceMessage::Unbind => {
            activity = false;
            engine.unbind_client();
        }
        ServiceMessage::Barrier(_) | ServiceMessage::Shutdown => {}
    }

    if activity {
        engine.note_activity();
    }
}

fn broadcast(subscribers: &Mutex<Vec<Sender<PlaybackEvent>>>, events: Vec<PlaybackEvent>) {
    if events.is_empty() {
        return;
    }
    let mut subscribers = lock(subscribers);
    for event in events {
        subscribers.retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_commands() {
        assert_eq!("next".parse::<Command>().unwrap(), Command::Next);
        assert_eq!("previous".parse::<Command>().unwrap(), Command::Previous);
        assert_eq!(" TogglePause\n".parse::<Command>().unwrap(), Command::TogglePause);
        assert_eq!("cyclerepeat".parse::<Command>().unwrap(), Command::CycleRepeat);
        assert_eq!("toggleshuffle".parse::<Command>().unwrap(), Command::ToggleShuffle);
        assert_eq!(
            "seek 1500".parse::<Command>().unwrap(),
            Command::Seek(Duration::from_millis(1500))
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(matches!(
            "rewind".parse::<Command>(),
            Err(PlaybackError::UnknownCommand(name)) if name == "rewind"
        ));
        assert!("seek".parse::<Command>().is_err());
        assert!("seek soon".parse::<Command>().is_err());
        assert!("next now".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for command in [
            Command::Next,
            Command::Previous,
            Command::TogglePause,
            Command::Pause,
            Command::Play,
            Command::Stop,
            Command::CycleRepeat,
            Command::ToggleShuffle,
            Command::Seek(Duration::from_millis(42)),
        ] {
            assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
        }
    }
}
