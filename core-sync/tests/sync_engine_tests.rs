//! Integration tests for sync passes against an in-memory catalog.
//!
//! These tests verify:
//! - Download state survives metadata refreshes
//! - Songs and containers missing upstream are pruned
//! - Unchanged and failed sub-trees are never pruned
//! - A backend never runs two passes at once
//! - Albums and artists follow the song set
//! - Grouping rebuilds never overlap a prune or each other

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use core_library::{
    Album, Artist, BackendId, CatalogStore, CatalogWrite, Container, ContainerQuery, DownloadState,
    InMemoryCatalogStore, Song, SongQuery,
};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use core_sync::{
    Backend, DownloadProgress, FailedScope, PassStatus, Result, ScanSink, SyncCoordinator,
    SyncError, SyncOutcome, SyncReport,
};
use tokio::sync::Notify;

// ============================================================================
// Scripted backend
// ============================================================================

#[derive(Clone)]
struct Node {
    id: String,
    version: String,
    songs: Vec<(String, String)>,
    children: Vec<Node>,
    fails: bool,
}

fn node(id: &str, version: &str) -> Node {
    Node {
        id: id.to_string(),
        version: version.to_string(),
        songs: Vec::new(),
        children: Vec::new(),
        fails: false,
    }
}

impl Node {
    fn song(mut self, id: &str, version: &str) -> Self {
        self.songs.push((id.to_string(), version.to_string()));
        self
    }

    fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    fn failing(mut self) -> Self {
        self.fails = true;
        self
    }
}

/// Walks a scripted tree the way a real backend walks its namespace.
struct ScriptedBackend {
    id: BackendId,
    tree: Mutex<Vec<Node>>,
    scan_error: Mutex<Option<String>>,
    started: Arc<Notify>,
    release: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    fn new(id: &str, tree: Vec<Node>) -> Self {
        Self {
            id: BackendId::new(id),
            tree: Mutex::new(tree),
            scan_error: Mutex::new(None),
            started: Arc::new(Notify::new()),
            release: None,
        }
    }

    fn gated(mut self, release: Arc<Notify>) -> Self {
        self.release = Some(release);
        self
    }

    fn set_tree(&self, tree: Vec<Node>) {
        *self.tree.lock().unwrap() = tree;
    }

    fn fail_scan(&self, message: &str) {
        *self.scan_error.lock().unwrap() = Some(message.to_string());
    }

    fn song(&self, id: &str, version: &str, parent: &str) -> Song {
        let mut song = Song::new(id, self.id.clone(), format!("mem://{}", id), version)
            .with_parent(parent)
            .with_title(format!("Title {}", id))
            .with_album(format!("Album of {}", parent))
            .with_artist("Miles Davis; Bill Evans");
        song.duration_ms = Some(180_000);
        song
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    async fn scan(&self, sink: Arc<dyn ScanSink>) -> Result<()> {
        self.started.notify_one();
        if let Some(release) = &self.release {
            release.notified().await;
        }

        let tree = self.tree.lock().unwrap().clone();
        let mut stack: Vec<(Node, Option<String>)> = tree.into_iter().map(|n| (n, None)).collect();

        while let Some((node, parent)) = stack.pop() {
            if node.fails {
                sink.report_failure(
                    FailedScope::Container {
                        container_id: node.id.clone(),
                        parent_container_id: parent.clone(),
                    },
                    SyncError::backend(&self.id, "listing timed out"),
                )
                .await;
                continue;
            }
            if !sink.approve_container(&node.id, &node.version).await {
                continue;
            }

            let mut container = Container::new(&node.id, self.id.clone(), &node.id, &node.version);
            container.parent_id = parent;
            sink.handle_container(container).await;

            for (song_id, version) in &node.songs {
                if sink.approve_song(song_id, version).await {
                    sink.handle_song(self.song(song_id, version, &node.id)).await;
                }
            }
            for child in node.children {
                stack.push((child, Some(node.id.clone())));
            }
        }

        match self.scan_error.lock().unwrap().clone() {
            Some(message) => Err(SyncError::backend(&self.id, message)),
            None => Ok(()),
        }
    }

    async fn fetch_song(&self, song: &Song, _progress: &dyn DownloadProgress) -> Result<String> {
        Ok(format!("/cache/{}.flac", song.id))
    }

    async fn evict_song(&self, _song: &Song) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn setup() -> (Arc<InMemoryCatalogStore>, SyncCoordinator) {
    let store = Arc::new(InMemoryCatalogStore::new());
    let coordinator = SyncCoordinator::new(store.clone());
    (store, coordinator)
}

async fn pass(coordinator: &SyncCoordinator, backend: &Arc<ScriptedBackend>) -> SyncReport {
    match coordinator.sync_backend(backend.clone()).await {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped { backend_id } => panic!("pass for {} was skipped", backend_id),
    }
}

async fn song_ids(store: &InMemoryCatalogStore) -> Vec<String> {
    let mut ids: Vec<String> = store
        .find_songs(SongQuery::All)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    ids.sort();
    ids
}

async fn container_ids(store: &InMemoryCatalogStore) -> Vec<String> {
    let mut ids: Vec<String> = store
        .find_containers(ContainerQuery::All)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    ids.sort();
    ids
}

fn strings(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_first_pass_ingests_everything() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new(
        "local",
        vec![node("root", "r1")
            .song("a", "v1")
            .child(node("x", "x1").song("b", "v1"))],
    ));

    let report = pass(&coordinator, &backend).await;

    assert_eq!(report.status, PassStatus::Complete);
    assert_eq!(report.stats.songs_inserted, 2);
    assert_eq!(report.stats.containers_inserted, 2);
    assert_eq!(song_ids(&store).await, strings(&["a", "b"]));

    let b = store.find_song("b").await.unwrap().unwrap();
    assert_eq!(b.parent_container_id.as_deref(), Some("x"));
    let x = store.find_container("x").await.unwrap().unwrap();
    assert_eq!(x.parent_id.as_deref(), Some("root"));
}

#[tokio::test]
async fn test_changed_version_marks_download_outdated() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new("drive", vec![node("c", "c1").song("a", "v1")]));
    pass(&coordinator, &backend).await;

    let mut a = store.find_song("a").await.unwrap().unwrap();
    a.download_state = DownloadState::Downloaded;
    a.download_progress = 1.0;
    a.local_path = Some("/cache/a.flac".to_string());
    store.insert_song(a).await.unwrap();

    backend.set_tree(vec![node("c", "c2").song("a", "v2")]);
    let report = pass(&coordinator, &backend).await;
    assert_eq!(report.stats.songs_updated, 1);

    let a = store.find_song("a").await.unwrap().unwrap();
    assert_eq!(a.version_id, "v2");
    assert_eq!(a.download_state, DownloadState::DownloadedOutdated);
    assert_eq!(a.local_path.as_deref(), Some("/cache/a.flac"));
}

#[tokio::test]
async fn test_unchanged_song_is_not_reemitted() {
    let (_store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new("local", vec![node("c", "c1").song("a", "v1")]));
    pass(&coordinator, &backend).await;

    // Container changed, song did not.
    backend.set_tree(vec![node("c", "c2").song("a", "v1").song("b", "v1")]);
    let report = pass(&coordinator, &backend).await;

    assert_eq!(report.stats.songs_skipped, 1);
    assert_eq!(report.stats.songs_inserted, 1);
    assert!(report.songs_removed.is_empty());
}

// ============================================================================
// Pruning
// ============================================================================

#[tokio::test]
async fn test_song_deleted_upstream_is_pruned() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new(
        "local",
        vec![node("c", "c1").song("a", "v1").song("b", "v1")],
    ));
    pass(&coordinator, &backend).await;

    backend.set_tree(vec![node("c", "c2").song("a", "v1")]);
    let report = pass(&coordinator, &backend).await;

    assert_eq!(report.songs_removed, strings(&["b"]));
    assert_eq!(song_ids(&store).await, strings(&["a"]));
}

#[tokio::test]
async fn test_skip_approved_container_keeps_children() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new(
        "local",
        vec![node("c", "c1").song("a", "v1").song("b", "v1")],
    ));
    pass(&coordinator, &backend).await;

    // Same version: the backend is told to skip and re-emits nothing.
    backend.set_tree(vec![node("c", "c1")]);
    let report = pass(&coordinator, &backend).await;

    assert_eq!(report.stats.containers_skipped, 1);
    assert!(report.songs_removed.is_empty());
    assert_eq!(song_ids(&store).await, strings(&["a", "b"]));
}

#[tokio::test]
async fn test_unchanged_root_protects_whole_chain() {
    let (store, coordinator) = setup();
    let tree = vec![node("root", "r1").child(node("x", "x1").child(node("y", "y1").song("s", "v1")))];
    let backend = Arc::new(ScriptedBackend::new("local", tree));
    pass(&coordinator, &backend).await;

    backend.set_tree(vec![node("root", "r1")]);
    let report = pass(&coordinator, &backend).await;

    assert!(report.containers_removed.is_empty());
    assert_eq!(container_ids(&store).await, strings(&["root", "x", "y"]));
    assert_eq!(song_ids(&store).await, strings(&["s"]));
}

#[tokio::test]
async fn test_rescanned_root_prunes_vanished_chain() {
    let (store, coordinator) = setup();
    let tree = vec![node("root", "r1").child(node("x", "x1").child(node("y", "y1").song("s", "v1")))];
    let backend = Arc::new(ScriptedBackend::new("local", tree));
    pass(&coordinator, &backend).await;

    backend.set_tree(vec![node("root", "r2")]);
    let report = pass(&coordinator, &backend).await;

    assert_eq!(report.songs_removed, strings(&["s"]));
    assert_eq!(report.containers_removed, strings(&["y", "x"]));
    assert_eq!(container_ids(&store).await, strings(&["root"]));
}

#[tokio::test]
async fn test_exempt_container_survives_prune() {
    let (store, coordinator) = setup();
    let tree = vec![node("root", "r1").child(node("x", "x1").song("s", "v1"))];
    let backend = Arc::new(ScriptedBackend::new("local", tree));
    pass(&coordinator, &backend).await;

    backend.set_tree(vec![node("root", "r2")]);
    let exempt: HashSet<String> = ["x".to_string()].into_iter().collect();
    let outcome = coordinator
        .sync_backend_with_exemptions(backend.clone(), exempt)
        .await;

    assert!(outcome.report().unwrap().songs_removed.is_empty());
    assert_eq!(container_ids(&store).await, strings(&["root", "x"]));
    assert_eq!(song_ids(&store).await, strings(&["s"]));
}

#[tokio::test]
async fn test_prune_is_scoped_to_backend() {
    let (store, coordinator) = setup();
    let local = Arc::new(ScriptedBackend::new("local", vec![node("l", "1").song("ls", "v1")]));
    let drive = Arc::new(ScriptedBackend::new("drive", vec![node("d", "1").song("ds", "v1")]));
    pass(&coordinator, &local).await;
    pass(&coordinator, &drive).await;

    drive.set_tree(Vec::new());
    pass(&coordinator, &drive).await;

    assert_eq!(song_ids(&store).await, strings(&["ls"]));
    assert_eq!(container_ids(&store).await, strings(&["l"]));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_subtree_is_kept_and_rescanned_next_time() {
    let (store, coordinator) = setup();
    let tree = vec![node("root", "r1").child(node("x", "x1").song("s", "v1"))];
    let backend = Arc::new(ScriptedBackend::new("drive", tree));
    pass(&coordinator, &backend).await;

    backend.set_tree(vec![node("root", "r2").child(node("x", "x2").failing())]);
    let report = pass(&coordinator, &backend).await;

    assert_eq!(report.status, PassStatus::Partial);
    assert_eq!(report.failures.len(), 1);
    assert!(report.songs_removed.is_empty());
    assert_eq!(song_ids(&store).await, strings(&["s"]));

    // Cleared versions force both levels to be listed again.
    assert_eq!(store.find_container("x").await.unwrap().unwrap().version_id, "");
    assert_eq!(store.find_container("root").await.unwrap().unwrap().version_id, "");

    backend.set_tree(vec![node("root", "r2").child(node("x", "x2").song("s", "v1"))]);
    let report = pass(&coordinator, &backend).await;
    assert_eq!(report.status, PassStatus::Complete);
    assert_eq!(report.stats.containers_skipped, 0);
    assert_eq!(store.find_container("x").await.unwrap().unwrap().version_id, "x2");
}

#[tokio::test]
async fn test_failed_scan_prunes_nothing() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new(
        "drive",
        vec![node("c", "c1").song("a", "v1").song("b", "v1")],
    ));
    pass(&coordinator, &backend).await;

    backend.set_tree(vec![node("c", "c2").song("a", "v1")]);
    backend.fail_scan("token expired");
    let report = pass(&coordinator, &backend).await;

    assert!(matches!(report.status, PassStatus::Aborted { recoverable: true, .. }));
    assert!(report.songs_removed.is_empty());
    assert_eq!(song_ids(&store).await, strings(&["a", "b"]));
    assert_eq!(store.find_container("c").await.unwrap().unwrap().version_id, "");
}

#[tokio::test]
async fn test_root_failure_prunes_nothing() {
    struct RootlessBackend(BackendId);

    #[async_trait]
    impl Backend for RootlessBackend {
        fn id(&self) -> &BackendId {
            &self.0
        }

        async fn scan(&self, sink: Arc<dyn ScanSink>) -> Result<()> {
            sink.report_failure(FailedScope::Root, SyncError::backend(&self.0, "offline"))
                .await;
            Ok(())
        }

        async fn fetch_song(&self, _song: &Song, _progress: &dyn DownloadProgress) -> Result<String> {
            Err(SyncError::backend(&self.0, "offline"))
        }

        async fn evict_song(&self, _song: &Song) -> Result<()> {
            Ok(())
        }
    }

    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new("drive", vec![node("c", "c1").song("a", "v1")]));
    pass(&coordinator, &backend).await;

    let outcome = coordinator
        .sync_backend(Arc::new(RootlessBackend(BackendId::new("drive"))))
        .await;
    assert!(matches!(
        outcome.report().unwrap().status,
        PassStatus::Aborted { .. }
    ));
    assert_eq!(song_ids(&store).await, strings(&["a"]));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_overlapping_pass_is_skipped() {
    let store = Arc::new(InMemoryCatalogStore::new());
    let coordinator = Arc::new(SyncCoordinator::new(store.clone()));
    let release = Arc::new(Notify::new());
    let backend = Arc::new(
        ScriptedBackend::new("local", vec![node("c", "c1").song("a", "v1")]).gated(release.clone()),
    );

    let started = backend.started.clone();
    let first = {
        let coordinator = coordinator.clone();
        let backend = backend.clone();
        tokio::spawn(async move { coordinator.sync_backend(backend).await })
    };
    started.notified().await;
    assert!(coordinator.is_scanning(&BackendId::new("local")));

    let second = coordinator.sync_backend(backend.clone()).await;
    assert!(matches!(second, SyncOutcome::Skipped { .. }));

    release.notify_one();
    let first = first.await.unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));
    assert!(!coordinator.is_scanning(&BackendId::new("local")));
    assert_eq!(song_ids(&store).await, strings(&["a"]));
}

#[tokio::test]
async fn test_different_backends_sync_in_parallel() {
    let (store, coordinator) = setup();
    let local = Arc::new(ScriptedBackend::new("local", vec![node("l", "1").song("ls", "v1")]));
    let drive = Arc::new(ScriptedBackend::new("drive", vec![node("d", "1").song("ds", "v1")]));

    let (a, b) = tokio::join!(
        coordinator.sync_backend(local.clone()),
        coordinator.sync_backend(drive.clone())
    );
    assert!(matches!(a, SyncOutcome::Completed(_)));
    assert!(matches!(b, SyncOutcome::Completed(_)));
    assert_eq!(song_ids(&store).await, strings(&["ds", "ls"]));
}

// ============================================================================
// Grouping and events
// ============================================================================

#[tokio::test]
async fn test_grouping_follows_song_set() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new(
        "local",
        vec![node("jazz", "j1").song("a", "v1").child(node("rock", "r1").song("b", "v1"))],
    ));
    let report = pass(&coordinator, &backend).await;
    assert_eq!(report.grouping.unwrap().albums, 2);

    let artists: Vec<String> = store.artists().await.unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(artists, strings(&["Bill Evans", "Miles Davis"]));

    backend.set_tree(vec![node("jazz", "j2").song("a", "v1")]);
    let report = pass(&coordinator, &backend).await;
    let grouping = report.grouping.unwrap();
    assert_eq!(grouping.albums_removed, 1);

    let albums: Vec<String> = store.albums().await.unwrap().into_iter().map(|a| a.title).collect();
    assert_eq!(albums, strings(&["Album of jazz"]));
}

#[tokio::test]
async fn test_pass_events() {
    let store = Arc::new(InMemoryCatalogStore::new());
    let bus = EventBus::new(64);
    let coordinator = SyncCoordinator::new(store).with_event_bus(bus.clone());
    let backend = Arc::new(ScriptedBackend::new(
        "local",
        vec![node("c", "c1").song("a", "v1").song("b", "v1")],
    ));
    pass(&coordinator, &backend).await;

    let mut events = bus.subscribe();
    backend.set_tree(vec![node("c", "c2").song("a", "v1")]);
    pass(&coordinator, &backend).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(received.first(), Some(CoreEvent::Sync(SyncEvent::Started { .. }))));
    assert!(received.iter().any(|e| matches!(
        e,
        CoreEvent::Library(LibraryEvent::SongsRemoved { song_ids }) if song_ids == &strings(&["b"])
    )));
    assert!(received.iter().any(|e| matches!(e, CoreEvent::Library(LibraryEvent::GroupingRebuilt { .. }))));
    assert!(matches!(
        received.last(),
        Some(CoreEvent::Sync(SyncEvent::Completed { songs_removed: 1, .. }))
    ));
}

#[tokio::test]
async fn test_download_manager_shares_catalog() {
    let (store, coordinator) = setup();
    let backend = Arc::new(ScriptedBackend::new("drive", vec![node("c", "c1").song("a", "v1")]));
    pass(&coordinator, &backend).await;

    let downloads = coordinator.download_manager();
    let song = downloads.fetch_song(backend.as_ref(), "a").await.unwrap();
    assert_eq!(song.download_state, DownloadState::Downloaded);
    assert!(store.albums().await.unwrap()[0].downloaded);

    // A later rescan with the same version keeps the cached copy.
    backend.set_tree(vec![node("c", "c2").song("a", "v1")]);
    pass(&coordinator, &backend).await;
    let song = store.find_song("a").await.unwrap().unwrap();
    assert_eq!(song.download_state, DownloadState::Downloaded);
}

// ============================================================================
// Catalog lock
// ============================================================================

/// In-memory store that can hold the prune read open and that records how
/// many full-catalog reads overlap.
#[derive(Default)]
struct GatedStore {
    inner: InMemoryCatalogStore,
    hold_backend_read: AtomicBool,
    entered: Notify,
    release: Notify,
    full_reads: AtomicUsize,
    max_full_reads: AtomicUsize,
}

#[async_trait]
impl CatalogStore for GatedStore {
    async fn find_songs(&self, query: SongQuery) -> core_library::Result<Vec<Song>> {
        match &query {
            SongQuery::ByBackend(_) if self.hold_backend_read.swap(false, Ordering::SeqCst) => {
                self.entered.notify_one();
                self.release.notified().await;
            }
            SongQuery::All => {
                let now = self.full_reads.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_full_reads.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.full_reads.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        self.inner.find_songs(query).await
    }

    async fn find_containers(&self, query: ContainerQuery) -> core_library::Result<Vec<Container>> {
        self.inner.find_containers(query).await
    }

    async fn albums(&self) -> core_library::Result<Vec<Album>> {
        self.inner.albums().await
    }

    async fn artists(&self) -> core_library::Result<Vec<Artist>> {
        self.inner.artists().await
    }

    async fn transaction(&self, writes: Vec<CatalogWrite>) -> core_library::Result<()> {
        self.inner.transaction(writes).await
    }
}

#[tokio::test]
async fn test_grouping_waits_for_in_flight_prune() {
    let store = Arc::new(GatedStore::default());
    let coordinator = SyncCoordinator::new(store.clone());
    let backend = Arc::new(ScriptedBackend::new(
        "local",
        vec![node("root", "r1").song("a", "v1")],
    ));
    store.hold_backend_read.store(true, Ordering::SeqCst);

    let sync = coordinator.sync_backend(backend.clone());
    let rebuild_after_prune_started = async {
        store.entered.notified().await;

        let rebuild = coordinator.rebuild_grouping();
        tokio::pin!(rebuild);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut rebuild)
                .await
                .is_err(),
            "grouping rebuild finished while a prune was running"
        );

        store.release.notify_one();
        rebuild.await
    };

    let (outcome, summary) = tokio::join!(sync, rebuild_after_prune_started);
    assert!(matches!(outcome, SyncOutcome::Completed(_)));
    assert_eq!(summary.unwrap().albums, 1);
}

#[tokio::test]
async fn test_grouping_rebuilds_never_overlap() {
    let store = Arc::new(GatedStore::default());
    store
        .inner
        .insert_song(Song::new("a", BackendId::new("local"), "mem://a", "v1").with_album("Blue"))
        .await
        .unwrap();
    let coordinator = SyncCoordinator::new(store.clone());

    let (first, second) = tokio::join!(coordinator.rebuild_grouping(), coordinator.rebuild_grouping());
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(store.max_full_reads.load(Ordering::SeqCst), 1);
}
