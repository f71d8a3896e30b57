//! Local folder backend
//!
//! Mirrors one directory tree. Directories become containers, `.flac` files
//! become songs that are always playable in place.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use core_library::{BackendId, Container, DownloadState, Song};
use core_metadata::{read_flac_metadata, SongTags};
use core_runtime::config::SyncSettings;
use core_sync::{Backend, DownloadProgress, FailedScope, ScanSink, SyncError};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::error::{LocalBackendError, Result};
use crate::walker::{walk, DirNode, FileEntry};

pub struct LocalFolderBackend {
    id: BackendId,
    root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    read_permits: Arc<Semaphore>,
    chunk_size: usize,
    max_header_bytes: usize,
}

impl LocalFolderBackend {
    pub fn new(
        id: BackendId,
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemAccess>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            id,
            root: root.into(),
            fs,
            read_permits: Arc::new(Semaphore::new(settings.max_concurrent_scans.max(1))),
            chunk_size: settings.flac_chunk_size,
            max_header_bytes: settings.max_flac_header_bytes,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Stable id for an entity at `relative` below the root.
    fn entity_id(&self, kind: &str, relative: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_str());
        hasher.update([0u8]);
        hasher.update(kind);
        hasher.update([0u8]);
        hasher.update(relative);
        hex::encode(hasher.finalize())
    }

    pub fn container_id(&self, relative: &str) -> String {
        self.entity_id("container", relative)
    }

    pub fn song_id(&self, relative: &str) -> String {
        self.entity_id("song", relative)
    }

    fn root_name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.to_string())
    }

    fn emit<'a>(
        &'a self,
        node: &'a DirNode,
        parent_id: Option<String>,
        sink: &'a Arc<dyn ScanSink>,
    ) -> BoxFuture<'a, ()> {
        async move {
            let container_id = self.container_id(&node.relative);

            if let Some(message) = &node.failure {
                sink.report_failure(
                    FailedScope::Container {
                        container_id,
                        parent_container_id: parent_id,
                    },
                    SyncError::backend(&self.id, message.clone()),
                )
                .await;
                return;
            }

            if !sink.approve_container(&container_id, &node.digest).await {
                debug!(directory = %node.relative, "Directory unchanged, skipping");
                return;
            }

            let mut container = Container::new(&container_id, self.id.clone(), &node.name, &node.digest);
            container.parent_id = parent_id;
            sink.handle_container(container).await;

            join_all(
                node.files
                    .iter()
                    .map(|file| self.emit_song(file, &container_id, sink)),
            )
            .await;
            join_all(
                node.children
                    .iter()
                    .map(|child| self.emit(child, Some(container_id.clone()), sink)),
            )
            .await;
        }
        .boxed()
    }

    async fn emit_song(&self, file: &FileEntry, container_id: &str, sink: &Arc<dyn ScanSink>) {
        let song_id = self.song_id(&file.relative);
        let version = file.version();
        if !sink.approve_song(&song_id, &version).await {
            return;
        }

        match self.read_song(file, &song_id, &version, container_id).await {
            Ok(song) => sink.handle_song(song).await,
            Err(e) => {
                sink.report_failure(
                    FailedScope::Song {
                        song_id,
                        parent_container_id: Some(container_id.to_string()),
                    },
                    e.into_sync_error(&self.id),
                )
                .await
            }
        }
    }

    async fn read_song(
        &self,
        file: &FileEntry,
        song_id: &str,
        version: &str,
        container_id: &str,
    ) -> Result<Song> {
        let _permit = self
            .read_permits
            .acquire()
            .await
            .map_err(|e| LocalBackendError::Aborted(e.to_string()))?;

        let mut reader = self.fs.open_read_stream(&file.path).await?;
        let metadata = read_flac_metadata(&mut reader, self.chunk_size, self.max_header_bytes).await?;

        let path = file.path.to_string_lossy().into_owned();
        let mut song = Song::new(song_id, self.id.clone(), format!("file://{}", path), version)
            .with_parent(container_id)
            .with_download_state(DownloadState::Downloaded);
        SongTags::from_flac(&metadata).apply_to(&mut song);
        if song.title.is_none() {
            song.title = Some(file.stem().to_string());
        }
        song.local = true;
        song.download_progress = 1.0;
        song.local_path = Some(path);
        Ok(song)
    }
}

#[async_trait]
impl Backend for LocalFolderBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    #[instrument(skip(self, sink), fields(backend_id = %self.id))]
    async fn scan(&self, sink: Arc<dyn ScanSink>) -> core_sync::Result<()> {
        match self.fs.metadata(&self.root).await {
            Ok(metadata) if metadata.is_directory => {}
            Ok(_) => {
                let root = self.root.display().to_string();
                return Err(LocalBackendError::InvalidRoot(root).into_sync_error(&self.id));
            }
            Err(e) => {
                sink.report_failure(FailedScope::Root, LocalBackendError::from(e).into_sync_error(&self.id))
                    .await;
                return Ok(());
            }
        }

        let tree = walk(self.fs.as_ref(), self.root.clone(), String::new(), self.root_name()).await;
        if let Some(message) = &tree.failure {
            sink.report_failure(FailedScope::Root, SyncError::backend(&self.id, message.clone()))
                .await;
            return Ok(());
        }

        info!(root = %self.root.display(), "Scanning local folder");
        self.emit(&tree, None, &sink).await;
        Ok(())
    }

    /// Local songs are played in place; this only checks the file is there.
    async fn fetch_song(&self, song: &Song, progress: &dyn DownloadProgress) -> core_sync::Result<String> {
        let path = song
            .local_path
            .clone()
            .ok_or_else(|| LocalBackendError::MissingFile(song.id.clone()).into_sync_error(&self.id))?;

        let metadata = self
            .fs
            .metadata(&PathBuf::from(&path))
            .await
            .map_err(|e| LocalBackendError::from(e).into_sync_error(&self.id))?;
        progress.report(metadata.size, Some(metadata.size)).await;
        Ok(path)
    }

    /// Never deletes user files.
    async fn evict_song(&self, _song: &Song) -> core_sync::Result<()> {
        Ok(())
    }
}
