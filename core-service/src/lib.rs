//! Core service façade and bootstrap helpers.
//!
//! Wires a [`CoreConfig`] into the catalog store, event bus and sync engine,
//! and keeps the registry of backends the host has added. Every collaborator
//! is constructed here and passed down explicitly; nothing in the core reads
//! global state.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .database_path("/data/library.db")
//!     .cache_dir("/data/cache")
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//! core.add_local_folder(BackendId::new("music"), "/home/me/Music").await?;
//! let outcomes = core.sync_all().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    Album, Artist, BackendId, CatalogStore, PlayQueue, Song, SongQuery, SqliteCatalogStore,
};
use core_runtime::{CoreConfig, EventBus, EventStream};
use core_sync::{Backend, GroupingSummary, SyncCoordinator, SyncError, SyncOutcome};
use futures::future::join_all;
use provider_local::LocalFolderBackend;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

/// `database_path` value selecting a private in-memory catalog.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: CoreConfig,
    store: Arc<dyn CatalogStore>,
    event_bus: EventBus,
    coordinator: SyncCoordinator,
    backends: RwLock<HashMap<BackendId, Arc<dyn Backend>>>,
    queue: Mutex<PlayQueue>,
}

impl CoreService {
    /// Open the SQLite catalog named by the config and build the service on it.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let db_config = if config.database_path == Path::new(IN_MEMORY_DATABASE) {
            DatabaseConfig::in_memory()
        } else {
            DatabaseConfig::new(&config.database_path)
        };
        let pool = create_pool(db_config)
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("catalog database: {}", e)))?;

        info!("Catalog database ready");
        let service = Self::with_store(config, Arc::new(SqliteCatalogStore::new(pool)));
        service.coordinator.download_manager().recover_interrupted().await?;
        Ok(service)
    }

    /// Build the service over an already constructed store.
    pub fn with_store(config: CoreConfig, store: Arc<dyn CatalogStore>) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        let coordinator = SyncCoordinator::new(store.clone())
            .with_event_bus(event_bus.clone())
            .with_settings(config.sync.clone());
        Self {
            config,
            store,
            event_bus,
            coordinator,
            backends: RwLock::new(HashMap::new()),
            queue: Mutex::new(PlayQueue::new()),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    // ------------------------------------------------------------------
    // Backends
    // ------------------------------------------------------------------

    pub async fn register_backend(&self, backend: Arc<dyn Backend>) -> Result<()> {
        let id = backend.id().clone();
        let mut backends = self.backends.write().await;
        if backends.contains_key(&id) {
            return Err(CoreError::DuplicateBackend(id.to_string()));
        }
        info!(backend_id = %id, "Registered backend");
        backends.insert(id, backend);
        Ok(())
    }

    /// Songs already in the catalog stay until the host removes them.
    pub async fn unregister_backend(&self, id: &BackendId) -> Option<Arc<dyn Backend>> {
        self.backends.write().await.remove(id)
    }

    pub async fn backend_ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self.backends.read().await.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Register a folder on local storage, read through the configured
    /// file system.
    pub async fn add_local_folder(&self, id: BackendId, root: impl Into<PathBuf>) -> Result<()> {
        let backend = LocalFolderBackend::new(
            id,
            root,
            self.config.file_system.clone(),
            &self.config.sync,
        );
        self.register_backend(Arc::new(backend)).await
    }

    /// Register a Google Drive folder, fetched through the configured HTTP
    /// client and cached under the configured cache directory.
    #[cfg(feature = "google-drive")]
    pub async fn add_google_drive(
        &self,
        id: BackendId,
        access_token: impl Into<String>,
        root_folder_id: impl Into<String>,
    ) -> Result<()> {
        use provider_google_drive::{DriveClient, GoogleDriveBackend};

        let client = DriveClient::new(self.config.http_client.clone(), access_token);
        let backend = GoogleDriveBackend::new(
            id,
            client,
            root_folder_id,
            self.config.file_system.clone(),
            self.config.cache_dir.clone(),
            &self.config.sync,
        );
        self.register_backend(Arc::new(backend)).await
    }

    async fn backend(&self, id: &BackendId) -> Result<Arc<dyn Backend>> {
        self.backends
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownBackend(id.to_string()).into())
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    pub async fn sync_backend(&self, id: &BackendId) -> Result<SyncOutcome> {
        let backend = self.backend(id).await?;
        let outcome = self.coordinator.sync_backend(backend).await;
        self.forget_removed_songs().await?;
        Ok(outcome)
    }

    /// One pass per registered backend, all running concurrently.
    pub async fn sync_all(&self) -> Vec<SyncOutcome> {
        let backends: Vec<Arc<dyn Backend>> = self.backends.read().await.values().cloned().collect();
        let outcomes = join_all(
            backends
                .into_iter()
                .map(|backend| self.coordinator.sync_backend(backend)),
        )
        .await;

        if let Err(e) = self.forget_removed_songs().await {
            warn!(error = %e, "Could not prune play queue");
        }
        outcomes
    }

    pub fn is_scanning(&self, id: &BackendId) -> bool {
        self.coordinator.is_scanning(id)
    }

    pub async fn rebuild_grouping(&self) -> Result<GroupingSummary> {
        Ok(self.coordinator.rebuild_grouping().await?)
    }

    async fn forget_removed_songs(&self) -> Result<()> {
        let known: HashSet<String> = self
            .store
            .find_songs(SongQuery::All)
            .await?
            .into_iter()
            .map(|song| song.id)
            .collect();
        let dropped = self.queue.lock().await.retain_known(&known);
        if dropped > 0 {
            info!(dropped, "Removed deleted songs from the play queue");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Downloads
    // ------------------------------------------------------------------

    async fn owning_backend(&self, song_id: &str) -> Result<Arc<dyn Backend>> {
        let song = self
            .store
            .find_song(song_id)
            .await?
            .ok_or_else(|| SyncError::SongNotFound(song_id.to_string()))?;
        self.backend(&song.backend_id).await
    }

    pub async fn fetch_song(&self, song_id: &str) -> Result<Song> {
        let backend = self.owning_backend(song_id).await?;
        Ok(self
            .coordinator
            .download_manager()
            .fetch_song(backend.as_ref(), song_id)
            .await?)
    }

    pub async fn evict_song(&self, song_id: &str) -> Result<Song> {
        let backend = self.owning_backend(song_id).await?;
        Ok(self
            .coordinator
            .download_manager()
            .evict_song(backend.as_ref(), song_id)
            .await?)
    }

    // ------------------------------------------------------------------
    // Catalog and queue
    // ------------------------------------------------------------------

    pub async fn songs(&self) -> Result<Vec<Song>> {
        Ok(self.store.find_songs(SongQuery::All).await?)
    }

    pub async fn albums(&self) -> Result<Vec<Album>> {
        Ok(self.store.albums().await?)
    }

    pub async fn artists(&self) -> Result<Vec<Artist>> {
        Ok(self.store.artists().await?)
    }

    /// Append catalog songs to the queue. Unknown ids are ignored; returns
    /// how many were queued.
    pub async fn enqueue(&self, song_ids: Vec<String>) -> Result<usize> {
        let mut known = Vec::with_capacity(song_ids.len());
        for id in song_ids {
            if self.store.find_song(&id).await?.is_some() {
                known.push(id);
            }
        }
        let queued = known.len();
        self.queue.lock().await.enqueue(known);
        Ok(queued)
    }

    /// Run `f` against the play queue.
    pub async fn with_queue<R>(&self, f: impl FnOnce(&mut PlayQueue) -> R) -> R {
        f(&mut *self.queue.lock().await)
    }
}
