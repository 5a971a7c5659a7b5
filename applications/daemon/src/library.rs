//! JSON track catalog
//!
//! The daemon has no metadata database. Tracks are listed in a JSON file:
//!
//! ```json
//! { "tracks": [
//!     { "id": 1, "path": "/music/a.mp3", "title": "A", "artist": "X",
//!       "album": "Y", "duration_ms": 183000 },
//!     { "id": 2, "path": "/podcasts/ep1.mp3", "title": "Episode 1",
//!       "duration_ms": 3600000, "long_form": true, "bookmark_ms": 61000 }
//! ] }
//! ```
//!
//! Bookmarks written by the engine are saved back into the same file.

use crate::error::{DaemonError, Result};
use nocturne_playback::{Library, TrackId, TrackSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One track in the catalog file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: TrackId,
    pub path: PathBuf,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub bookmark_ms: u64,
    #[serde(default)]
    pub long_form: bool,
    #[serde(default)]
    pub favorite: bool,
}

impl CatalogEntry {
    fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            path: self.path.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration: Duration::from_millis(self.duration_ms),
            bookmark: Duration::from_millis(self.bookmark_ms),
            long_form: self.long_form,
        }
    }

    fn matches(&self, filter: Option<&str>) -> bool {
        match filter {
            Some(text) => self.title.to_lowercase().contains(&text.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tracks: Vec<CatalogEntry>,
}

/// [`Library`] backed by the catalog file
#[derive(Debug, Default)]
pub struct JsonLibrary {
    path: Option<PathBuf>,
    entries: Vec<CatalogEntry>,
    index: HashMap<TrackId, usize>,
}

impl JsonLibrary {
    /// Load the catalog at `path`; a missing file is an empty catalog
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<CatalogFile>(&text).map_err(|e| {
                DaemonError::Catalog(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Catalog not found, starting empty");
                CatalogFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        let mut library = Self::from_entries(file.tracks);
        library.path = Some(path);
        tracing::info!(tracks = library.len(), "Loaded track catalog");
        Ok(library)
    }

    /// In-memory catalog that is never written back
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if index.insert(entry.id, position).is_some() {
                tracing::warn!(track = %entry.id, "Duplicate track id in catalog, keeping the last");
            }
        }
        Self {
            path: None,
            entries,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Track lengths by file, for the simulated player
    pub fn durations(&self) -> HashMap<PathBuf, Duration> {
        self.entries
            .iter()
            .map(|entry| (entry.path.clone(), Duration::from_millis(entry.duration_ms)))
            .collect()
    }

    fn entry(&self, id: TrackId) -> Option<&CatalogEntry> {
        self.index.get(&id).map(|&position| &self.entries[position])
    }

    fn members(&self, filter: Option<&str>, belongs: impl Fn(&CatalogEntry) -> bool) -> Vec<TrackId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(position, entry)| self.index.get(&entry.id) == Some(position))
            .map(|(_, entry)| entry)
            .filter(|entry| belongs(entry) && entry.matches(filter))
            .map(|entry| entry.id)
            .collect()
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = CatalogFile {
            tracks: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

impl Library for JsonLibrary {
    fn track(&self, id: TrackId) -> Option<TrackSnapshot> {
        self.entry(id).map(CatalogEntry::snapshot)
    }

    fn album_tracks(&self, album: &str, filter: Option<&str>) -> Vec<TrackId> {
        self.members(filter, |entry| entry.album == album)
    }

    fn artist_tracks(&self, artist: &str, filter: Option<&str>) -> Vec<TrackId> {
        self.members(filter, |entry| entry.artist == artist)
    }

    fn set_bookmark(&mut self, id: TrackId, bookmark: Duration) {
        let Some(&position) = self.index.get(&id) else {
            return;
        };
        self.entries[position].bookmark_ms = u64::try_from(bookmark.as_millis()).unwrap_or(u64::MAX);

        if let Some(path) = &self.path {
            if let Err(e) = self.save(path) {
                tracing::warn!(track = %id, error = %e, "Failed to save bookmark");
            }
        }
    }

    fn is_favorite(&self, id: TrackId) -> bool {
        self.entry(id).is_some_and(|entry| entry.favorite)
    }
}
