//! Domain models for the aggregated catalog
//!
//! Songs and containers are owned by exactly one backend. Albums and artists
//! are derived from the song set and rebuilt after every sync pass.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

/// Identifier of a configured backend (one local folder, one Drive account...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct BackendId(pub String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Download State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    Downloading,
    Downloaded,
    /// A cached copy exists but the upstream content changed since.
    DownloadedOutdated,
}

impl DownloadState {
    /// Whether a playable local copy exists, current or not.
    pub fn has_local_copy(self) -> bool {
        matches!(
            self,
            DownloadState::Downloaded | DownloadState::DownloadedOutdated
        )
    }

    /// State after the upstream version changed.
    pub fn after_upstream_change(self) -> Self {
        match self {
            DownloadState::Downloaded | DownloadState::DownloadedOutdated => {
                DownloadState::DownloadedOutdated
            }
            DownloadState::Downloading => DownloadState::Downloading,
            DownloadState::NotDownloaded => DownloadState::NotDownloaded,
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadState::NotDownloaded => "not_downloaded",
            DownloadState::Downloading => "downloading",
            DownloadState::Downloaded => "downloaded",
            DownloadState::DownloadedOutdated => "downloaded_outdated",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// A playable item as reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Song {
    /// Stable across rescans of the same underlying item.
    pub id: String,
    pub backend_id: BackendId,
    pub source_url: String,

    pub title: Option<String>,
    /// May hold several names joined by [`ARTIST_DELIMITER`].
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub grouping: Option<String>,
    pub performer: Option<String>,

    pub duration_ms: Option<i64>,
    pub year: Option<i32>,
    pub track_number: Option<i32>,
    pub disc_number: Option<i32>,
    pub artwork: Option<Vec<u8>>,

    /// Lives on local storage; never needs fetching.
    pub local: bool,
    pub download_state: DownloadState,
    /// 0.0 to 1.0
    pub download_progress: f64,
    /// Path of the cached copy, when one exists.
    pub local_path: Option<String>,

    /// Opaque backend change token.
    pub version_id: String,
    pub parent_container_id: Option<String>,
}

/// Separator between names in a multi-artist tag.
pub const ARTIST_DELIMITER: &str = "; ";

impl Song {
    pub fn new(
        id: impl Into<String>,
        backend_id: BackendId,
        source_url: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            backend_id,
            source_url: source_url.into(),
            title: None,
            artist: None,
            album: None,
            genre: None,
            composer: None,
            grouping: None,
            performer: None,
            duration_ms: None,
            year: None,
            track_number: None,
            disc_number: None,
            artwork: None,
            local: false,
            download_state: DownloadState::NotDownloaded,
            download_progress: 0.0,
            local_path: None,
            version_id: version_id.into(),
            parent_container_id: None,
        }
    }

    pub fn with_parent(mut self, container_id: impl Into<String>) -> Self {
        self.parent_container_id = Some(container_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_download_state(mut self, state: DownloadState) -> Self {
        self.download_state = state;
        self
    }

    /// Individual artist names, split on [`ARTIST_DELIMITER`].
    pub fn artist_names(&self) -> Vec<&str> {
        self.artist
            .as_deref()
            .map(|artists| {
                artists
                    .split(ARTIST_DELIMITER)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Song id cannot be empty".to_string());
        }
        if self.backend_id.as_str().is_empty() {
            return Err("Song backend id cannot be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.download_progress) {
            return Err(format!(
                "Download progress {} is outside 0.0..=1.0",
                self.download_progress
            ));
        }
        Ok(())
    }
}

/// A folder-like grouping mirroring the backend's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Container {
    pub id: String,
    pub backend_id: BackendId,
    pub name: String,
    /// Empty until the container has been fully scanned once.
    pub version_id: String,
    pub parent_id: Option<String>,
}

impl Container {
    pub fn new(
        id: impl Into<String>,
        backend_id: BackendId,
        name: impl Into<String>,
        version_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            backend_id,
            name: name.into(),
            version_id: version_id.into(),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Container id cannot be empty".to_string());
        }
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err("Container cannot be its own parent".to_string());
        }
        Ok(())
    }
}

/// Songs sharing an album title, across all backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub title: String,
    /// Sorted.
    pub song_ids: Vec<String>,
    /// Every member song is fully downloaded.
    pub downloaded: bool,
}

/// Songs crediting one artist name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    /// Sorted.
    pub song_ids: Vec<String>,
}
