//! # Download Manager
//!
//! Drives a song's download state around [`Backend::fetch_song`] and
//! [`Backend::evict_song`]:
//!
//! ```text
//! not_downloaded ──fetch──> downloading ──ok──> downloaded
//!        ^                       │
//!        └─────────error─────────┘
//! downloaded / downloaded_outdated ──evict──> not_downloaded
//! ```
//!
//! The backend only moves bytes; every state change is persisted here and
//! mirrored on the event bus when one is attached.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use core_library::{CatalogStore, CatalogWrite, DownloadState, Song, SongQuery};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, DownloadProgress};
use crate::error::{Result, SyncError};
use crate::grouping::refresh_album;

/// Persist progress every this many percent.
const PROGRESS_STEP_PERCENT: u8 = 10;

pub struct DownloadManager {
    store: Arc<dyn CatalogStore>,
    catalog_lock: Arc<RwLock<()>>,
    event_bus: Option<EventBus>,
    in_flight: Mutex<HashSet<String>>,
}

impl DownloadManager {
    /// `catalog_lock` is shared with the sync coordinator so album flag
    /// refreshes never race a grouping rebuild.
    pub fn new(store: Arc<dyn CatalogStore>, catalog_lock: Arc<RwLock<()>>) -> Self {
        Self {
            store,
            catalog_lock,
            event_bus: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Download(event)).ok();
        }
    }

    async fn load(&self, song_id: &str) -> Result<Song> {
        self.store
            .find_song(song_id)
            .await?
            .ok_or_else(|| SyncError::SongNotFound(song_id.to_string()))
    }

    async fn save(&self, song: Song) -> Result<()> {
        let album = song.album.clone();
        self.store.transaction(vec![CatalogWrite::PutSong(song)]).await?;
        if let Some(title) = album {
            let _guard = self.catalog_lock.write().await;
            refresh_album(self.store.as_ref(), &title).await?;
        }
        Ok(())
    }

    /// Fetch a song's bytes through its backend.
    ///
    /// Local songs and songs with a current cached copy are returned as they
    /// are. A second request for a song already being fetched, here or as
    /// recorded in the store, returns the in-progress state without starting
    /// another transfer.
    #[instrument(skip(self, backend), fields(backend_id = %backend.id()))]
    pub async fn fetch_song(&self, backend: &dyn Backend, song_id: &str) -> Result<Song> {
        let song = {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains(song_id) {
                debug!("Download already in flight");
                return self.load(song_id).await;
            }

            let song = self.load(song_id).await?;
            if song.local {
                debug!("Song is playable in place");
                return Ok(song);
            }
            match song.download_state {
                DownloadState::Downloaded => {
                    debug!("Song already available locally");
                    return Ok(song);
                }
                DownloadState::Downloading => {
                    debug!("Song is already downloading");
                    return Ok(song);
                }
                DownloadState::NotDownloaded | DownloadState::DownloadedOutdated => {}
            }
            in_flight.insert(song_id.to_string());
            song
        };

        let result = self.run_fetch(backend, song).await;
        self.in_flight.lock().await.remove(song_id);
        result
    }

    /// Reset songs left `downloading` by a transfer that is no longer
    /// running, e.g. one cut short by a restart. Returns how many were reset.
    #[instrument(skip(self))]
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let in_flight = self.in_flight.lock().await;
        let mut writes = Vec::new();
        for mut song in self.store.find_songs(SongQuery::All).await? {
            if song.download_state != DownloadState::Downloading || in_flight.contains(&song.id) {
                continue;
            }
            song.download_state = DownloadState::NotDownloaded;
            song.download_progress = 0.0;
            song.local_path = None;
            writes.push(CatalogWrite::PutSong(song));
        }

        let reset = writes.len();
        if reset > 0 {
            self.store.transaction(writes).await?;
            info!(reset, "Reset interrupted downloads");
        }
        Ok(reset)
    }

    async fn run_fetch(&self, backend: &dyn Backend, mut song: Song) -> Result<Song> {
        let fetched_version = song.version_id.clone();
        song.download_state = DownloadState::Downloading;
        song.download_progress = 0.0;
        self.save(song.clone()).await?;
        self.emit(DownloadEvent::Started {
            song_id: song.id.clone(),
        });

        let reporter = ProgressReporter {
            song_id: song.id.clone(),
            store: self.store.clone(),
            event_bus: self.event_bus.clone(),
            last_percent: Mutex::new(0),
        };

        match backend.fetch_song(&song, &reporter).await {
            Ok(local_path) => {
                // A sync pass may have refreshed the song meanwhile.
                let mut current = self.load(&song.id).await?;
                current.download_state = if current.version_id == fetched_version {
                    DownloadState::Downloaded
                } else {
                    DownloadState::DownloadedOutdated
                };
                current.download_progress = 1.0;
                current.local_path = Some(local_path.clone());
                self.save(current.clone()).await?;

                info!(song_id = %current.id, state = %current.download_state, "Download finished");
                self.emit(DownloadEvent::Completed {
                    song_id: current.id.clone(),
                    local_path,
                });
                Ok(current)
            }
            Err(e) => {
                warn!(song_id = %song.id, error = %e, "Download failed");
                if let Some(mut current) = self.store.find_song(&song.id).await? {
                    current.download_state = DownloadState::NotDownloaded;
                    current.download_progress = 0.0;
                    current.local_path = None;
                    self.save(current).await?;
                }
                self.emit(DownloadEvent::Failed {
                    song_id: song.id.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Drop the cached copy of a song. Local songs are left untouched.
    #[instrument(skip(self, backend), fields(backend_id = %backend.id()))]
    pub async fn evict_song(&self, backend: &dyn Backend, song_id: &str) -> Result<Song> {
        let mut song = self.load(song_id).await?;
        if song.local {
            debug!("Local song has no cached copy to evict");
            return Ok(song);
        }

        if song.local_path.is_some() {
            backend.evict_song(&song).await?;
        }

        song.download_state = DownloadState::NotDownloaded;
        song.download_progress = 0.0;
        song.local_path = None;
        self.save(song.clone()).await?;

        self.emit(DownloadEvent::Evicted {
            song_id: song.id.clone(),
        });
        Ok(song)
    }
}

struct ProgressReporter {
    song_id: String,
    store: Arc<dyn CatalogStore>,
    event_bus: Option<EventBus>,
    last_percent: Mutex<u8>,
}

#[async_trait]
impl DownloadProgress for ProgressReporter {
    async fn report(&self, bytes_downloaded: u64, total_bytes: Option<u64>) {
        let percent = match total_bytes {
            Some(total) if total > 0 => ((bytes_downloaded.min(total) * 100) / total) as u8,
            _ => 0,
        };

        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Download(DownloadEvent::Progress {
                song_id: self.song_id.clone(),
                bytes_downloaded,
                total_bytes,
                percent,
            }))
            .ok();
        }

        let mut last = self.last_percent.lock().await;
        if percent < last.saturating_add(PROGRESS_STEP_PERCENT) || percent >= 100 {
            return;
        }
        *last = percent;
        drop(last);

        // Progress only; a sync pass may be rewriting the rest of the row.
        let write = CatalogWrite::SetDownloadProgress {
            song_id: self.song_id.clone(),
            progress: f64::from(percent) / 100.0,
        };
        if let Err(e) = self.store.transaction(vec![write]).await {
            debug!(song_id = %self.song_id, error = %e, "Could not persist download progress");
        }
    }
}
