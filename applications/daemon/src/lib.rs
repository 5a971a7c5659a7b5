//! Nocturne Daemon Library
//!
//! Hosts the playback engine as a long-running process: JSON catalog and
//! state files, a clock-driven player and a line-based TCP control socket.
//!
//! This library exposes the components for testing purposes.

pub mod config;
pub mod error;
pub mod host;
pub mod ipc;
pub mod library;
pub mod player;
pub mod store;

// Re-export commonly used types for convenience
pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use host::start_service;
pub use ipc::Request;
pub use library::{CatalogEntry, JsonLibrary};
pub use player::ClockPlayer;
pub use store::FileStateStore;
