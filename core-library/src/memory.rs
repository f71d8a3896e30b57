//! In-memory catalog store for tests and ephemeral sessions.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::models::{Album, Artist, Container, DownloadState, Song};
use crate::store::{CatalogStore, CatalogWrite, ContainerQuery, SongQuery};

#[derive(Debug, Default, Clone)]
struct CatalogState {
    songs: BTreeMap<String, Song>,
    containers: BTreeMap<String, Container>,
    albums: BTreeMap<String, Album>,
    artists: BTreeMap<String, Artist>,
}

impl CatalogState {
    fn apply(&mut self, write: CatalogWrite) -> Result<()> {
        match write {
            CatalogWrite::PutSong(song) => {
                song.validate().map_err(|message| LibraryError::InvalidInput {
                    field: "song".to_string(),
                    message,
                })?;
                self.songs.insert(song.id.clone(), song);
            }
            CatalogWrite::DeleteSong(id) => {
                self.songs.remove(&id);
            }
            CatalogWrite::PutContainer(container) => {
                container
                    .validate()
                    .map_err(|message| LibraryError::InvalidInput {
                        field: "container".to_string(),
                        message,
                    })?;
                self.containers.insert(container.id.clone(), container);
            }
            CatalogWrite::DeleteContainer(id) => {
                self.containers.remove(&id);
            }
            CatalogWrite::PutAlbum(album) => {
                self.albums.insert(album.title.clone(), album);
            }
            CatalogWrite::DeleteAlbum(title) => {
                self.albums.remove(&title);
            }
            CatalogWrite::PutArtist(artist) => {
                self.artists.insert(artist.name.clone(), artist);
            }
            CatalogWrite::DeleteArtist(name) => {
                self.artists.remove(&name);
            }
            CatalogWrite::SetDownloadProgress { song_id, progress } => {
                if let Some(song) = self.songs.get_mut(&song_id) {
                    if song.download_state == DownloadState::Downloading {
                        song.download_progress = progress.clamp(0.0, 1.0);
                    }
                }
            }
        }
        Ok(())
    }

    fn check_constraints(&self) -> Result<()> {
        for song in self.songs.values() {
            if let Some(parent) = &song.parent_container_id {
                if !self.containers.contains_key(parent) {
                    return Err(LibraryError::ConstraintViolation {
                        entity: "song",
                        id: song.id.clone(),
                        message: format!("parent container {} does not exist", parent),
                    });
                }
            }
        }

        for container in self.containers.values() {
            let mut seen = HashSet::new();
            seen.insert(container.id.as_str());
            let mut cursor = container.parent_id.as_deref();
            while let Some(parent_id) = cursor {
                let Some(parent) = self.containers.get(parent_id) else {
                    return Err(LibraryError::ConstraintViolation {
                        entity: "container",
                        id: container.id.clone(),
                        message: format!("parent container {} does not exist", parent_id),
                    });
                };
                if !seen.insert(parent_id) {
                    return Err(LibraryError::ConstraintViolation {
                        entity: "container",
                        id: container.id.clone(),
                        message: "parent chain forms a cycle".to_string(),
                    });
                }
                cursor = parent.parent_id.as_deref();
            }
        }

        Ok(())
    }
}

/// [`CatalogStore`] kept entirely in memory.
///
/// Batches are applied to a copy of the state and swapped in only when every
/// constraint holds, so readers never observe a half-applied batch.
///
/// Each batch clones the whole state and re-walks every container chain, so
/// ingesting N entities one batch at a time costs O(N²). Fine for tests and
/// small ephemeral catalogs; use [`SqliteCatalogStore`](crate::SqliteCatalogStore)
/// for real libraries.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_songs(&self, query: SongQuery) -> Result<Vec<Song>> {
        let state = self.state.read().await;
        Ok(state
            .songs
            .values()
            .filter(|song| query.matches(song))
            .cloned()
            .collect())
    }

    async fn find_containers(&self, query: ContainerQuery) -> Result<Vec<Container>> {
        let state = self.state.read().await;
        Ok(state
            .containers
            .values()
            .filter(|container| query.matches(container))
            .cloned()
            .collect())
    }

    async fn albums(&self) -> Result<Vec<Album>> {
        Ok(self.state.read().await.albums.values().cloned().collect())
    }

    async fn artists(&self) -> Result<Vec<Artist>> {
        Ok(self.state.read().await.artists.values().cloned().collect())
    }

    async fn transaction(&self, writes: Vec<CatalogWrite>) -> Result<()> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let count = writes.len();

        for write in writes {
            staged.apply(write)?;
        }
        staged.check_constraints()?;

        *state = staged;
        debug!(writes = count, "Committed in-memory catalog batch");
        Ok(())
    }
}
