//! Error types for playback management

use crate::types::TrackId;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Library has no entry for the track
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// Media player rejected an operation
    #[error("Media player error: {0}")]
    Player(#[from] PlayerError),

    /// Command string not understood
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Service worker is no longer running
    #[error("Playback service has stopped")]
    ServiceStopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the media player capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// Operation requires an opened source
    #[error("player not initialized")]
    NotInitialized,

    /// The source could not be opened or decoded
    #[error("source rejected: {0}")]
    SourceRejected(String),

    /// The playback backend died and must be recreated
    #[error("media server died")]
    ServerDied,
}

/// Failures reported by the persistence store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
