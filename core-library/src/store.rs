//! # Catalog Store Contract
//!
//! Durable collection of songs, containers, albums and artists. The sync
//! engine only relies on predicate queries and atomic batches of writes.
//!
//! ## Constraints
//!
//! Checked when a batch commits; any violation rolls the whole batch back:
//! - ids are non-empty
//! - a song's `parent_container_id` names a stored container
//! - a container's `parent_id` names a stored container, and parent links
//!   never form a cycle

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Album, Artist, BackendId, Container, Song};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongQuery {
    All,
    ById(String),
    ByBackend(BackendId),
    ByContainer(String),
    ByAlbum(String),
}

impl SongQuery {
    pub fn matches(&self, song: &Song) -> bool {
        match self {
            SongQuery::All => true,
            SongQuery::ById(id) => &song.id == id,
            SongQuery::ByBackend(backend) => &song.backend_id == backend,
            SongQuery::ByContainer(container) => {
                song.parent_container_id.as_ref() == Some(container)
            }
            SongQuery::ByAlbum(title) => song.album.as_ref() == Some(title),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerQuery {
    All,
    ById(String),
    ByBackend(BackendId),
    /// Direct children of a container.
    Children(String),
}

impl ContainerQuery {
    pub fn matches(&self, container: &Container) -> bool {
        match self {
            ContainerQuery::All => true,
            ContainerQuery::ById(id) => &container.id == id,
            ContainerQuery::ByBackend(backend) => &container.backend_id == backend,
            ContainerQuery::Children(parent) => container.parent_id.as_ref() == Some(parent),
        }
    }
}

/// One write inside a batch. `Put*` inserts or replaces by key.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogWrite {
    PutSong(Song),
    DeleteSong(String),
    PutContainer(Container),
    DeleteContainer(String),
    PutAlbum(Album),
    DeleteAlbum(String),
    PutArtist(Artist),
    DeleteArtist(String),
    /// Sets only `download_progress`, and only while the song is still
    /// `downloading`. Every other field is left as stored.
    SetDownloadProgress { song_id: String, progress: f64 },
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Matching songs ordered by id.
    async fn find_songs(&self, query: SongQuery) -> Result<Vec<Song>>;

    /// Matching containers ordered by id.
    async fn find_containers(&self, query: ContainerQuery) -> Result<Vec<Container>>;

    /// All albums ordered by title.
    async fn albums(&self) -> Result<Vec<Album>>;

    /// All artists ordered by name.
    async fn artists(&self) -> Result<Vec<Artist>>;

    /// Commit every write or none of them.
    async fn transaction(&self, writes: Vec<CatalogWrite>) -> Result<()>;

    async fn find_song(&self, id: &str) -> Result<Option<Song>> {
        let mut songs = self.find_songs(SongQuery::ById(id.to_string())).await?;
        Ok(songs.pop())
    }

    async fn find_container(&self, id: &str) -> Result<Option<Container>> {
        let mut containers = self
            .find_containers(ContainerQuery::ById(id.to_string()))
            .await?;
        Ok(containers.pop())
    }

    async fn insert_song(&self, song: Song) -> Result<()> {
        self.transaction(vec![CatalogWrite::PutSong(song)]).await
    }

    async fn insert_container(&self, container: Container) -> Result<()> {
        self.transaction(vec![CatalogWrite::PutContainer(container)])
            .await
    }

    async fn delete_song(&self, id: &str) -> Result<()> {
        self.transaction(vec![CatalogWrite::DeleteSong(id.to_string())])
            .await
    }

    async fn delete_container(&self, id: &str) -> Result<()> {
        self.transaction(vec![CatalogWrite::DeleteContainer(id.to_string())])
            .await
    }
}
