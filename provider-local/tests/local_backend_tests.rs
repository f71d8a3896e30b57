//! Integration tests for the local folder backend
//!
//! These tests verify:
//! - Directory trees are mirrored as containers and FLAC files as songs
//! - Untouched sub-trees are skipped without opening files
//! - Deleted files are pruned, unreadable directories are kept
//! - Broken FLAC files are reported without losing known songs

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::{FileMetadata, FileSystemAccess};
use bytes::Bytes;
use core_library::{
    BackendId, CatalogStore, ContainerQuery, DownloadState, InMemoryCatalogStore, SongQuery,
};
use core_runtime::config::SyncSettings;
use core_sync::{
    Backend, IgnoreProgress, PassStatus, SyncCoordinator, SyncOutcome, SyncReport,
};
use provider_local::LocalFolderBackend;
use tokio::io::{AsyncRead, AsyncWrite};

// ============================================================================
// In-memory file system
// ============================================================================

#[derive(Default)]
struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, (Vec<u8>, i64)>>,
    unreadable: Mutex<HashSet<PathBuf>>,
    opens: AtomicUsize,
}

impl MemoryFs {
    fn put(&self, path: &str, data: Vec<u8>, modified_at: i64) {
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), (data, modified_at));
    }

    fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(Path::new(path));
    }

    fn deny(&self, path: &str) {
        self.unreadable.lock().unwrap().insert(PathBuf::from(path));
    }

    fn opens(&self) -> usize {
        self.opens.swap(0, Ordering::SeqCst)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFs {
    async fn get_cache_directory(&self) -> BridgeResult<PathBuf> {
        Ok(PathBuf::from("/cache"))
    }

    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.files.lock().unwrap().contains_key(path) || self.is_dir(path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        if let Some((data, modified_at)) = self.files.lock().unwrap().get(path) {
            return Ok(FileMetadata {
                size: data.len() as u64,
                modified_at: Some(*modified_at),
                is_directory: false,
            });
        }
        if self.is_dir(path) {
            return Ok(FileMetadata {
                size: 0,
                modified_at: None,
                is_directory: true,
            });
        }
        Err(BridgeError::NotFound(path.display().to_string()))
    }

    async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(data, _)| Bytes::from(data.clone()))
            .ok_or_else(|| BridgeError::NotFound(path.display().to_string()))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), (data.to_vec(), 0));
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
        if self.unreadable.lock().unwrap().contains(path) {
            return Err(BridgeError::OperationFailed("permission denied".to_string()));
        }
        let mut entries = BTreeSet::new();
        for file in self.files.lock().unwrap().keys() {
            if let Ok(rest) = file.strip_prefix(path) {
                if let Some(first) = rest.components().next() {
                    entries.insert(path.join(first.as_os_str()));
                }
            }
        }
        Ok(entries.into_iter().collect())
    }

    async fn open_read_stream(&self, path: &Path) -> BridgeResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let data = self.read_file(path).await?;
        Ok(Box::new(std::io::Cursor::new(data.to_vec())))
    }

    async fn open_write_stream(&self, _path: &Path) -> BridgeResult<Box<dyn AsyncWrite + Send + Unpin>> {
        Err(BridgeError::NotAvailable("read-only test file system".to_string()))
    }
}

// ============================================================================
// FLAC fixtures
// ============================================================================

fn block_header(last: bool, block_type: u8, len: usize) -> Vec<u8> {
    let flag = if last { 0x80 } else { 0x00 };
    vec![flag | block_type, (len >> 16) as u8, (len >> 8) as u8, len as u8]
}

fn flac(comments: &[&str], audio_len: usize) -> Vec<u8> {
    let mut out = b"fLaC".to_vec();

    let mut info = vec![0x10, 0x00, 0x10, 0x00, 0, 0, 0, 0, 0, 0];
    let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 441_000;
    info.extend_from_slice(&packed.to_be_bytes());
    info.extend_from_slice(&[0u8; 16]);
    out.extend(block_header(false, 0, info.len()));
    out.extend(info);

    let mut vorbis = Vec::new();
    vorbis.extend_from_slice(&0u32.to_le_bytes());
    vorbis.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for comment in comments {
        vorbis.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        vorbis.extend_from_slice(comment.as_bytes());
    }
    out.extend(block_header(true, 4, vorbis.len()));
    out.extend(vorbis);

    out.extend(std::iter::repeat(0xAB).take(audio_len));
    out
}

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    fs: Arc<MemoryFs>,
    store: Arc<InMemoryCatalogStore>,
    coordinator: SyncCoordinator,
    backend: Arc<LocalFolderBackend>,
}

fn fixture() -> Fixture {
    let fs = Arc::new(MemoryFs::default());
    fs.put(
        "/music/Jazz/so_what.flac",
        flac(&["TITLE=So What", "ARTIST=Miles Davis", "ALBUM=Kind of Blue", "TRACKNUMBER=1/5"], 512),
        100,
    );
    fs.put("/music/Jazz/liner_notes.txt", b"notes".to_vec(), 100);
    fs.put(
        "/music/Rock/Live/encore.flac",
        flac(&["ARTIST=Someone; Someone Else"], 512),
        200,
    );

    let store = Arc::new(InMemoryCatalogStore::new());
    let coordinator = SyncCoordinator::new(store.clone());
    let backend = Arc::new(LocalFolderBackend::new(
        BackendId::new("local"),
        "/music",
        fs.clone(),
        &SyncSettings::default().with_flac_chunk_size(64),
    ));
    Fixture {
        fs,
        store,
        coordinator,
        backend,
    }
}

async fn pass(f: &Fixture) -> SyncReport {
    match f.coordinator.sync_backend(f.backend.clone()).await {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped { .. } => panic!("pass skipped"),
    }
}

async fn titles(store: &InMemoryCatalogStore) -> Vec<String> {
    let mut titles: Vec<String> = store
        .find_songs(SongQuery::All)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|s| s.title)
        .collect();
    titles.sort();
    titles
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_scan_mirrors_tree() {
    let f = fixture();
    let report = pass(&f).await;

    assert_eq!(report.status, PassStatus::Complete);
    assert_eq!(report.stats.songs_inserted, 2);
    assert_eq!(report.stats.containers_inserted, 4);
    assert_eq!(titles(&f.store).await, vec!["So What", "encore"]);

    let song_id = f.backend.song_id("Jazz/so_what.flac");
    let song = f.store.find_song(&song_id).await.unwrap().unwrap();
    assert!(song.local);
    assert_eq!(song.download_state, DownloadState::Downloaded);
    assert_eq!(song.album.as_deref(), Some("Kind of Blue"));
    assert_eq!(song.track_number, Some(1));
    assert_eq!(song.duration_ms, Some(10_000));
    assert_eq!(song.local_path.as_deref(), Some("/music/Jazz/so_what.flac"));
    assert_eq!(song.parent_container_id, Some(f.backend.container_id("Jazz")));

    let live = f
        .store
        .find_container(&f.backend.container_id("Rock/Live"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.parent_id, Some(f.backend.container_id("Rock")));

    let artists: Vec<String> = f.store.artists().await.unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(artists, vec!["Miles Davis", "Someone", "Someone Else"]);
}

#[tokio::test]
async fn test_untouched_tree_reads_nothing() {
    let f = fixture();
    pass(&f).await;
    assert_eq!(f.fs.opens(), 2);

    let report = pass(&f).await;
    assert_eq!(f.fs.opens(), 0);
    assert_eq!(report.stats.containers_skipped, 1);
    assert!(report.songs_removed.is_empty());
    assert_eq!(titles(&f.store).await.len(), 2);
}

#[tokio::test]
async fn test_touched_file_is_reread_alone() {
    let f = fixture();
    pass(&f).await;
    f.fs.opens();

    f.fs.put(
        "/music/Rock/Live/encore.flac",
        flac(&["TITLE=Encore (Remaster)"], 512),
        300,
    );
    let report = pass(&f).await;

    assert_eq!(f.fs.opens(), 1);
    // Jazz is untouched and skipped as a whole.
    assert_eq!(report.stats.containers_skipped, 1);
    assert_eq!(report.stats.songs_updated, 1);
    assert_eq!(titles(&f.store).await, vec!["Encore (Remaster)", "So What"]);
}

#[tokio::test]
async fn test_deleted_file_and_directory_are_pruned() {
    let f = fixture();
    pass(&f).await;

    f.fs.remove("/music/Rock/Live/encore.flac");
    let report = pass(&f).await;

    assert_eq!(report.songs_removed.len(), 1);
    assert_eq!(report.containers_removed.len(), 2);
    assert_eq!(titles(&f.store).await, vec!["So What"]);

    let containers = f
        .store
        .find_containers(ContainerQuery::ByBackend(BackendId::new("local")))
        .await
        .unwrap();
    assert_eq!(containers.len(), 2);
}

#[tokio::test]
async fn test_unreadable_directory_is_kept() {
    let f = fixture();
    pass(&f).await;

    f.fs.deny("/music/Rock");
    f.fs.put("/music/Jazz/blue_in_green.flac", flac(&["TITLE=Blue in Green"], 64), 400);
    let report = pass(&f).await;

    assert_eq!(report.status, PassStatus::Partial);
    assert!(report.songs_removed.is_empty());
    assert_eq!(titles(&f.store).await, vec!["Blue in Green", "So What", "encore"]);
}

#[tokio::test]
async fn test_broken_flac_is_reported_not_pruned() {
    let f = fixture();
    pass(&f).await;

    f.fs.put("/music/Jazz/so_what.flac", b"RIFF not a flac".to_vec(), 500);
    f.fs.put("/music/Jazz/new.flac", b"garbage".to_vec(), 500);
    let report = pass(&f).await;

    assert_eq!(report.status, PassStatus::Partial);
    assert_eq!(report.failures.len(), 2);
    assert!(report.songs_removed.is_empty());
    assert_eq!(titles(&f.store).await, vec!["So What", "encore"]);

    // The directory stays dirty until its files read cleanly.
    let jazz = f
        .store
        .find_container(&f.backend.container_id("Jazz"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(jazz.version_id, "");
}

#[tokio::test]
async fn test_missing_root_aborts_without_pruning() {
    let f = fixture();
    pass(&f).await;

    let gone = Arc::new(LocalFolderBackend::new(
        BackendId::new("local"),
        "/elsewhere",
        f.fs.clone(),
        &SyncSettings::default(),
    ));
    let outcome = f.coordinator.sync_backend(gone).await;

    assert!(matches!(
        outcome.report().unwrap().status,
        PassStatus::Aborted { .. }
    ));
    assert_eq!(titles(&f.store).await.len(), 2);
}

#[tokio::test]
async fn test_fetch_and_evict_leave_files_alone() {
    let f = fixture();
    pass(&f).await;

    let song_id = f.backend.song_id("Jazz/so_what.flac");
    let song = f.store.find_song(&song_id).await.unwrap().unwrap();
    let path = f.backend.fetch_song(&song, &IgnoreProgress).await.unwrap();
    assert_eq!(path, "/music/Jazz/so_what.flac");

    let downloads = f.coordinator.download_manager();
    let evicted = downloads.evict_song(f.backend.as_ref(), &song_id).await.unwrap();
    assert_eq!(evicted.download_state, DownloadState::Downloaded);
    assert!(f.fs.exists(Path::new("/music/Jazz/so_what.flac")).await.unwrap());
}
