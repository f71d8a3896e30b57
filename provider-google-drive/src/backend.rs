//! Google Drive backend
//!
//! Folders below a configured root become containers and FLAC files become
//! songs. Folder versions are always empty because Drive has no deep folder
//! checksum, so every folder is listed on every pass while unchanged files are
//! still skipped by their checksum.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use core_library::{BackendId, Container, Song};
use core_metadata::{read_flac_metadata, SongTags};
use core_runtime::config::SyncSettings;
use core_sync::{Backend, DownloadProgress, FailedScope, ScanSink, SyncError};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::client::DriveClient;
use crate::error::{GoogleDriveError, Result};
use crate::types::DriveFile;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

pub struct GoogleDriveBackend {
    id: BackendId,
    client: DriveClient,
    root_folder_id: String,
    fs: Arc<dyn FileSystemAccess>,
    cache_dir: PathBuf,
    request_permits: Arc<Semaphore>,
    chunk_size: usize,
    max_header_bytes: usize,
}

impl GoogleDriveBackend {
    pub fn new(
        id: BackendId,
        client: DriveClient,
        root_folder_id: impl Into<String>,
        fs: Arc<dyn FileSystemAccess>,
        cache_dir: impl Into<PathBuf>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            id,
            client,
            root_folder_id: root_folder_id.into(),
            fs,
            cache_dir: cache_dir.into(),
            request_permits: Arc::new(Semaphore::new(settings.max_concurrent_scans.max(1))),
            chunk_size: settings.flac_chunk_size,
            max_header_bytes: settings.max_flac_header_bytes,
        }
    }

    /// Where a fetched song is cached.
    pub fn cache_path(&self, song_id: &str) -> PathBuf {
        self.cache_dir
            .join(self.id.as_str())
            .join(format!("{}.flac", song_id))
    }

    async fn list_folder(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let _permit = self
            .request_permits
            .acquire()
            .await
            .map_err(|e| GoogleDriveError::Aborted(e.to_string()))?;
        self.client.list_children(folder_id).await
    }

    fn emit<'a>(
        &'a self,
        folder: DriveFile,
        parent_id: Option<String>,
        sink: &'a Arc<dyn ScanSink>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if !sink.approve_container(&folder.id, "").await {
                return;
            }
            match self.list_folder(&folder.id).await {
                Ok(children) => self.emit_listed(folder, children, parent_id, sink).await,
                Err(e) => {
                    warn!(folder_id = %folder.id, error = %e, "Could not list folder");
                    sink.report_failure(
                        FailedScope::Container {
                            container_id: folder.id.clone(),
                            parent_container_id: parent_id,
                        },
                        e.into_sync_error(&self.id),
                    )
                    .await;
                }
            }
        }
        .boxed()
    }

    async fn emit_listed(
        &self,
        folder: DriveFile,
        children: Vec<DriveFile>,
        parent_id: Option<String>,
        sink: &Arc<dyn ScanSink>,
    ) {
        let mut container = Container::new(&folder.id, self.id.clone(), &folder.name, "");
        container.parent_id = parent_id;
        sink.handle_container(container).await;

        let (folders, files): (Vec<DriveFile>, Vec<DriveFile>) =
            children.into_iter().partition(DriveFile::is_folder);

        join_all(
            files
                .iter()
                .filter(|file| file.is_flac())
                .map(|file| self.emit_song(file, &folder.id, sink)),
        )
        .await;
        join_all(
            folders
                .into_iter()
                .map(|child| self.emit(child, Some(folder.id.clone()), sink)),
        )
        .await;
    }

    async fn emit_song(&self, file: &DriveFile, folder_id: &str, sink: &Arc<dyn ScanSink>) {
        let version = file.version();
        if !sink.approve_song(&file.id, &version).await {
            return;
        }

        match self.read_song(file, &version, folder_id).await {
            Ok(song) => sink.handle_song(song).await,
            Err(e) => {
                debug!(file_id = %file.id, error = %e, "Could not read FLAC header");
                sink.report_failure(
                    FailedScope::Song {
                        song_id: file.id.clone(),
                        parent_container_id: Some(folder_id.to_string()),
                    },
                    e.into_sync_error(&self.id),
                )
                .await
            }
        }
    }

    /// Streams the file only until the last metadata block is decoded.
    async fn read_song(&self, file: &DriveFile, version: &str, folder_id: &str) -> Result<Song> {
        let _permit = self
            .request_permits
            .acquire()
            .await
            .map_err(|e| GoogleDriveError::Aborted(e.to_string()))?;

        let mut stream = self.client.open_media(&file.id).await?;
        let metadata = read_flac_metadata(&mut stream, self.chunk_size, self.max_header_bytes).await?;
        drop(stream);

        let mut song = Song::new(&file.id, self.id.clone(), self.client.media_url(&file.id), version)
            .with_parent(folder_id);
        SongTags::from_flac(&metadata).apply_to(&mut song);
        if song.title.is_none() {
            song.title = Some(file.stem().to_string());
        }
        Ok(song)
    }

    async fn download_to_cache(&self, song: &Song, progress: &dyn DownloadProgress) -> Result<PathBuf> {
        let total = self.client.get_file(&song.id).await?.size_bytes();
        let path = self.cache_path(&song.id);
        if let Some(dir) = path.parent() {
            self.fs.create_dir_all(dir).await?;
        }

        let mut reader = self.client.open_media(&song.id).await?;
        let mut writer = self.fs.open_write_stream(&path).await?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;

        loop {
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(bridge_traits::BridgeError::from)?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .await
                .map_err(bridge_traits::BridgeError::from)?;
            written += read as u64;
            progress.report(written, total).await;
        }
        writer.shutdown().await.map_err(bridge_traits::BridgeError::from)?;

        if let Some(expected) = total {
            if expected != written {
                return Err(GoogleDriveError::IncompleteDownload { written, expected });
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl Backend for GoogleDriveBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    #[instrument(skip(self, sink), fields(backend_id = %self.id, root = %self.root_folder_id))]
    async fn scan(&self, sink: Arc<dyn ScanSink>) -> core_sync::Result<()> {
        let root = match self.client.get_file(&self.root_folder_id).await {
            Ok(root) => root,
            Err(e) => {
                sink.report_failure(FailedScope::Root, e.into_sync_error(&self.id))
                    .await;
                return Ok(());
            }
        };
        if !root.is_folder() {
            return Err(SyncError::backend(
                &self.id,
                format!("{} is not a folder", self.root_folder_id),
            ));
        }

        info!(root = %root.name, "Scanning Google Drive folder");
        if !sink.approve_container(&root.id, "").await {
            return Ok(());
        }
        match self.list_folder(&root.id).await {
            Ok(children) => self.emit_listed(root, children, None, &sink).await,
            Err(e) => {
                sink.report_failure(FailedScope::Root, e.into_sync_error(&self.id))
                    .await
            }
        }
        Ok(())
    }

    #[instrument(skip(self, song, progress), fields(backend_id = %self.id, song_id = %song.id))]
    async fn fetch_song(&self, song: &Song, progress: &dyn DownloadProgress) -> core_sync::Result<String> {
        match self.download_to_cache(song, progress).await {
            Ok(path) => Ok(path.to_string_lossy().into_owned()),
            Err(e) => {
                self.fs.delete_file(&self.cache_path(&song.id)).await.ok();
                Err(e.into_sync_error(&self.id))
            }
        }
    }

    async fn evict_song(&self, song: &Song) -> core_sync::Result<()> {
        let path = song
            .local_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.cache_path(&song.id));
        match self.fs.delete_file(&path).await {
            Ok(()) | Err(bridge_traits::BridgeError::NotFound(_)) => Ok(()),
            Err(e) => Err(GoogleDriveError::from(e).into_sync_error(&self.id)),
        }
    }
}
