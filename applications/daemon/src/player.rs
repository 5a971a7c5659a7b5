//! Clock-driven media player
//!
//! Stands in for an audio backend: it accepts any file the catalog knows
//! and that exists on disk, advances its position with wall time while
//! started, and reports completion through the service channel. Every
//! state change bumps a generation counter so a completion timer armed
//! for an older state is ignored.

use crossbeam_channel::Sender;
use nocturne_playback::{MediaPlayer, PlayerError, ServiceMessage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Transport {
    source: Option<PathBuf>,
    duration: Duration,
    offset: Duration,
    started: Option<Instant>,
    volume: f32,
    generation: u64,
}

impl Transport {
    fn position(&self) -> Duration {
        let elapsed = self.started.map_or(Duration::ZERO, |at| at.elapsed());
        (self.offset + elapsed).min(self.duration)
    }

    /// Freeze the position and invalidate pending completions
    fn halt(&mut self) {
        self.offset = self.position();
        self.started = None;
        self.generation += 1;
    }
}

/// Simulated [`MediaPlayer`]
#[derive(Debug, Clone)]
pub struct ClockPlayer {
    transport: Arc<Mutex<Transport>>,
    durations: Arc<HashMap<PathBuf, Duration>>,
    events: Sender<ServiceMessage>,
}

impl ClockPlayer {
    /// `durations` lists every playable file; completions go to `events`
    pub fn new(events: Sender<ServiceMessage>, durations: HashMap<PathBuf, Duration>) -> Self {
        Self {
            transport: Arc::new(Mutex::new(Transport {
                volume: 1.0,
                ..Transport::default()
            })),
            durations: Arc::new(durations),
            events,
        }
    }

    /// Current output gain
    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn is_started(&self) -> bool {
        self.lock().started.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm a completion for the current generation
    fn arm_completion(&self, transport: &Transport) {
        let remaining = transport.duration.saturating_sub(transport.offset);
        let generation = transport.generation;
        let shared = Arc::clone(&self.transport);
        let events = self.events.clone();

        let spawned = thread::Builder::new()
            .name("nocturne-clock-player".into())
            .spawn(move || {
                thread::sleep(remaining);
                let mut transport = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if transport.generation != generation {
                    return;
                }
                transport.offset = transport.duration;
                transport.started = None;
                transport.generation += 1;
                drop(transport);

                tracing::debug!("Simulated track finished");
                if events.send(ServiceMessage::PlayerCompleted).is_err() {
                    tracing::debug!("Service gone, dropping completion");
                }
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to arm completion timer");
        }
    }
}

impl MediaPlayer for ClockPlayer {
    fn set_source(&mut self, path: &Path) -> Result<(), PlayerError> {
        let mut transport = self.lock();
        transport.halt();
        transport.source = None;
        transport.offset = Duration::ZERO;

        let Some(&duration) = self.durations.get(path) else {
            return Err(PlayerError::SourceRejected(format!(
                "{} is not in the catalog",
                path.display()
            )));
        };
        if !path.exists() {
            return Err(PlayerError::SourceRejected(format!(
                "{} does not exist",
                path.display()
            )));
        }

        transport.source = Some(path.to_path_buf());
        transport.duration = duration;
        tracing::debug!(path = %path.display(), ?duration, "Source set");
        Ok(())
    }

    fn start(&mut self) {
        let mut transport = self.lock();
        if transport.source.is_none() || transport.started.is_some() {
            return;
        }
        transport.generation += 1;
        transport.started = Some(Instant::now());
        self.arm_completion(&transport);
    }

    fn pause(&mut self) {
        self.lock().halt();
    }

    fn stop(&mut self) {
        let mut transport = self.lock();
        transport.halt();
        transport.offset = Duration::ZERO;
    }

    fn release(&mut self) {
        let mut transport = self.lock();
        transport.halt();
        transport.source = None;
        transport.offset = Duration::ZERO;
        transport.duration = Duration::ZERO;
    }

    fn recreate(&mut self) {
        tracing::info!("Recreating simulated player");
        self.release();
    }

    fn seek(&mut self, position: Duration) -> Duration {
        let mut transport = self.lock();
        let playing = transport.started.is_some();
        transport.halt();
        transport.offset = position.min(transport.duration);
        if playing {
            transport.started = Some(Instant::now());
            self.arm_completion(&transport);
        }
        transport.offset
    }

    fn position(&self) -> Duration {
        self.lock().position()
    }

    fn duration(&self) -> Duration {
        self.lock().duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn is_initialized(&self) -> bool {
        self.lock().source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::fs;

    fn player_with(duration: Duration) -> (ClockPlayer, PathBuf, tempfile::TempDir, crossbeam_channel::Receiver<ServiceMessage>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        fs::write(&path, b"").unwrap();
        let (tx, rx) = unbounded();
        let player = ClockPlayer::new(tx, HashMap::from([(path.clone(), duration)]));
        (player, path, dir, rx)
    }

    #[test]
    fn test_rejects_unknown_and_missing_sources() {
        let (mut player, path, dir, _rx) = player_with(Duration::from_secs(1));
        assert!(matches!(
            player.set_source(&dir.path().join("other.mp3")),
            Err(PlayerError::SourceRejected(_))
        ));
        fs::remove_file(&path).unwrap();
        assert!(player.set_source(&path).is_err());
        assert!(!player.is_initialized());
    }

    #[test]
    fn test_completion_is_reported() {
        let (mut player, path, _dir, rx) = player_with(Duration::from_millis(30));
        player.set_source(&path).unwrap();
        player.start();

        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(message, ServiceMessage::PlayerCompleted));
        assert_eq!(player.position(), Duration::from_millis(30));
        assert!(!player.is_started());
    }

    #[test]
    fn test_paused_player_does_not_complete() {
        let (mut player, path, _dir, rx) = player_with(Duration::from_millis(50));
        player.set_source(&path).unwrap();
        player.start();
        player.pause();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(player.position() < Duration::from_millis(50));
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut player, path, _dir, _rx) = player_with(Duration::from_secs(10));
        player.set_source(&path).unwrap();
        assert_eq!(player.seek(Duration::from_secs(4)), Duration::from_secs(4));
        assert_eq!(player.position(), Duration::from_secs(4));
        assert_eq!(player.seek(Duration::from_secs(40)), Duration::from_secs(10));
    }

    #[test]
    fn test_release_drops_source() {
        let (mut player, path, _dir, _rx) = player_with(Duration::from_secs(10));
        player.set_source(&path).unwrap();
        player.set_volume(0.5);
        player.release();
        assert!(!player.is_initialized());
        assert_eq!(player.duration(), Duration::ZERO);
        assert_eq!(player.volume(), 0.5);
    }
}
