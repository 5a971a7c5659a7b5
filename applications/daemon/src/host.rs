//! Wiring the engine to the daemon's collaborators
use crate::{
    config::DaemonConfig, error::Result, library::JsonLibrary, player::ClockPlayer,
    store::FileStateStore,
};
use nocturne_playback::{service, Collaborators, LrcFileSource, PlaybackEngine, PlaybackService};

/// Build the engine from `config`, restore the saved queue and start the
/// worker thread
pub fn start_service(config: &DaemonConfig) -> Result<PlaybackService> {
    let (tx, rx) = service::channel();

    let library = JsonLibrary::load(&config.storage.library_path)?;
    let player = ClockPlayer::new(tx.clone(), library.durations());
    let store = FileStateStore::open(&config.storage.state_path);
    tracing::info!(
        catalog = %config.storage.library_path.display(),
        state = %store.path().display(),
        "Storage opened"
    );

    let mut collaborators = Collaborators::new(Box::new(player), Box::new(library), Box::new(store));
    if config.storage.lyrics {
        collaborators = collaborators.with_lyrics(Box::new(LrcFileSource));
    }

    let mut engine = PlaybackEngine::new(config.playback.clone(), collaborators);
    if !engine.reload_queue() {
        tracing::info!("No saved queue to restore");
    }
    // Restoring may emit events nobody is subscribed to yet
    let _ = engine.drain_events();

    Ok(PlaybackService::start(engine, tx, rx)?)
}
