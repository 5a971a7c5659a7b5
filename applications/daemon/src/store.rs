//! JSON file backed state store
use nocturne_playback::{MemoryStore, StateStore, StoreError};
use std::fs;
use std::path::{Path, PathBuf};

/// [`StateStore`] that keeps values in memory and writes them out as one
/// JSON object on commit
///
/// The file is replaced through a temporary sibling and a rename, so a
/// crash mid-write leaves the previous state intact.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    values: MemoryStore,
    dirty: bool,
}

impl FileStateStore {
    /// Open the store at `path`
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged
    /// and also starts empty; the engine then simply has nothing to restore.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<MemoryStore>(&text) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt state file");
                    MemoryStore::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read state file");
                MemoryStore::new()
            }
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "Opened state store");
        Self {
            path,
            values,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.values)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get_string(key)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get_i64(key)
    }

    fn put_string(&mut self, key: &str, value: String) {
        if self.values.get_string(key).as_deref() != Some(value.as_str()) {
            self.values.put_string(key, value);
            self.dirty = true;
        }
    }

    fn put_i64(&mut self, key: &str, value: i64) {
        if self.values.get_i64(key) != Some(value) {
            self.values.put_i64(key, value);
            self.dirty = true;
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        self.write()?;
        self.dirty = false;
        Ok(())
    }
}
