//! # Scan Approval
//!
//! Decides whether a backend has to re-read an entity. The oracle only sees a
//! read-only [`VersionLookup`], so it can be backed by the live store, by a
//! snapshot taken before the pass, or by anything a test wants.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use core_library::{BackendId, CatalogStore, ContainerQuery, SongQuery};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Song,
    Container,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Song => "song",
            EntityKind::Container => "container",
        }
    }
}

/// Read-only access to stored version tokens.
#[async_trait]
pub trait VersionLookup: Send + Sync {
    async fn version_of(&self, kind: EntityKind, id: &str) -> Result<Option<String>>;
}

/// Reads versions straight from a catalog store.
pub struct StoreVersionLookup {
    store: Arc<dyn CatalogStore>,
}

impl StoreVersionLookup {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VersionLookup for StoreVersionLookup {
    async fn version_of(&self, kind: EntityKind, id: &str) -> Result<Option<String>> {
        let version = match kind {
            EntityKind::Song => self.store.find_song(id).await?.map(|song| song.version_id),
            EntityKind::Container => self
                .store
                .find_container(id)
                .await?
                .map(|container| container.version_id),
        };
        Ok(version)
    }
}

/// Versions of one backend's entities frozen at a point in time.
#[derive(Debug, Clone, Default)]
pub struct VersionSnapshot {
    songs: HashMap<String, String>,
    containers: HashMap<String, String>,
}

impl VersionSnapshot {
    pub async fn capture(store: &dyn CatalogStore, backend_id: &BackendId) -> Result<Self> {
        let songs = store
            .find_songs(SongQuery::ByBackend(backend_id.clone()))
            .await?
            .into_iter()
            .map(|song| (song.id, song.version_id))
            .collect();
        let containers = store
            .find_containers(ContainerQuery::ByBackend(backend_id.clone()))
            .await?
            .into_iter()
            .map(|container| (container.id, container.version_id))
            .collect();
        Ok(Self { songs, containers })
    }

    pub fn with_version(mut self, kind: EntityKind, id: impl Into<String>, version: impl Into<String>) -> Self {
        match kind {
            EntityKind::Song => self.songs.insert(id.into(), version.into()),
            EntityKind::Container => self.containers.insert(id.into(), version.into()),
        };
        self
    }
}

#[async_trait]
impl VersionLookup for VersionSnapshot {
    async fn version_of(&self, kind: EntityKind, id: &str) -> Result<Option<String>> {
        let versions = match kind {
            EntityKind::Song => &self.songs,
            EntityKind::Container => &self.containers,
        };
        Ok(versions.get(id).cloned())
    }
}

#[derive(Clone)]
pub struct ApprovalOracle {
    lookup: Arc<dyn VersionLookup>,
}

impl ApprovalOracle {
    pub fn new(lookup: Arc<dyn VersionLookup>) -> Self {
        Self { lookup }
    }

    /// `true` when the entity is unknown or its stored version differs.
    ///
    /// An empty remote version means the backend has no change token for the
    /// entity, so it is always approved. Lookup failures approve as well: a
    /// redundant re-read is recoverable, a skipped change is not.
    pub async fn approve(&self, kind: EntityKind, id: &str, remote_version: &str) -> bool {
        if remote_version.is_empty() {
            return true;
        }

        match self.lookup.version_of(kind, id).await {
            Ok(Some(stored)) => stored != remote_version,
            Ok(None) => true,
            Err(e) => {
                warn!(entity = kind.as_str(), id, error = %e, "Version lookup failed, approving re-scan");
                true
            }
        }
    }
}
