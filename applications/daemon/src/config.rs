//! Daemon configuration
use crate::error::{DaemonError, Result};
use nocturne_playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "nocturne.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default = "default_ipc")]
    pub ipc: IpcSettings,

    #[serde(default = "default_storage")]
    pub storage: StorageSettings,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcSettings {
    /// Control socket, `host:port`
    #[serde(default = "default_address")]
    pub address: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Saved queue and modes (JSON)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Track catalog (JSON)
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,

    /// Look for `.lrc` files next to each track
    #[serde(default = "default_lyrics")]
    pub lyrics: bool,
}

impl DaemonConfig {
    /// Load configuration from file and environment
    ///
    /// `path` must exist when given; otherwise `nocturne.toml` in the
    /// working directory is read if present. Environment variables
    /// prefixed with `NOCTURNE_` override the file, with `__` between
    /// section and key (`NOCTURNE_IPC__ADDRESS`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        let config_path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        if config_path.exists() {
            settings = settings.add_source(config::File::from(config_path));
        } else if path.is_some() {
            return Err(DaemonError::Config(format!(
                "config file not found: {}",
                config_path.display()
            )));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("NOCTURNE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| DaemonError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        let playback = &self.playback;
        if playback.fade_up_step <= 0.0 || playback.fade_down_step <= 0.0 {
            return Err(DaemonError::Config(
                "fade steps must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&playback.duck_floor) {
            return Err(DaemonError::Config(format!(
                "duck_floor must be between 0 and 1, got {}",
                playback.duck_floor
            )));
        }
        if playback.fade_tick_ms == 0 {
            return Err(DaemonError::Config("fade_tick_ms must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Parsed control socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.ipc.address.parse().map_err(|e| {
            DaemonError::Config(format!("invalid ipc address {:?}: {e}", self.ipc.address))
        })
    }
}

// Default values
fn default_ipc() -> IpcSettings {
    IpcSettings {
        address: default_address(),
    }
}

fn default_address() -> String {
    "127.0.0.1:7700".to_string()
}

fn default_storage() -> StorageSettings {
    StorageSettings {
        state_path: default_state_path(),
        library_path: default_library_path(),
        lyrics: default_lyrics(),
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./data/state.json")
}

fn default_library_path() -> PathBuf {
    PathBuf::from("./data/library.json")
}

fn default_lyrics() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ipc: default_ipc(),
            storage: default_storage(),
            playback: PlaybackConfig::default(),
        }
    }
}
