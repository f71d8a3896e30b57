//! # Sync Coordinator
//!
//! Runs reconciliation passes that bring one backend's partition of the
//! catalog in line with what the backend currently holds.
//!
//! ## Workflow
//!
//! 1. Refuse to start when the backend is already mid-pass
//! 2. Hand the backend a [`ScanSession`] that approves, ingests and records
//!    everything it reports
//! 3. Clear the stored version of every container whose sub-tree failed, so
//!    the next pass lists it again
//! 4. Prune songs and containers that disappeared upstream, unless the pass
//!    was unreliable as a whole
//! 5. Rebuild albums and artists
//! 6. Report the outcome, both as a return value and on the event bus
//!
//! ## Concurrency
//!
//! Different backends sync in parallel. Pruning takes the catalog lock for
//! reading and the grouping rebuild takes it for writing, so a rebuild always
//! sees a catalog no prune is halfway through.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncCoordinator, SyncOutcome};
//!
//! let coordinator = SyncCoordinator::new(store).with_event_bus(bus);
//! match coordinator.sync_backend(backend).await {
//!     SyncOutcome::Completed(report) => println!("{:?}", report.status),
//!     SyncOutcome::Skipped { backend_id } => println!("{} still scanning", backend_id),
//! }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use core_library::{BackendId, CatalogStore, CatalogWrite, ContainerQuery, SongQuery};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::approval::{ApprovalOracle, StoreVersionLookup, VersionLookup};
use crate::backend::{Backend, ScanSink};
use crate::downloads::DownloadManager;
use crate::error::Result;
use crate::grouping::{rebuild_grouping, GroupingSummary};
use crate::prune::{plan_prune, PrunePlan};
use crate::session::{PassStats, ScanFailure, ScanSession, SessionSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassStatus {
    /// Everything was listed and reconciled.
    Complete,
    /// Some sub-trees or entities failed; they were kept as they were.
    Partial,
    /// The scan as a whole failed; nothing was pruned.
    Aborted { message: String, recoverable: bool },
}

/// Result of one pass over one backend.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub pass_id: String,
    pub backend_id: BackendId,
    pub status: PassStatus,
    pub stats: PassStats,
    pub failures: Vec<ScanFailure>,
    pub songs_removed: Vec<String>,
    pub containers_removed: Vec<String>,
    pub grouping: Option<GroupingSummary>,
    pub grouping_error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// A pass for this backend was already running.
    Skipped { backend_id: BackendId },
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}

/// Marks a backend as scanning for as long as it lives.
struct ScanGuard {
    active: Arc<StdMutex<HashSet<BackendId>>>,
    backend_id: BackendId,
}

impl ScanGuard {
    fn acquire(active: &Arc<StdMutex<HashSet<BackendId>>>, backend_id: &BackendId) -> Option<Self> {
        let mut scanning = active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !scanning.insert(backend_id.clone()) {
            return None;
        }
        Some(Self {
            active: Arc::clone(active),
            backend_id: backend_id.clone(),
        })
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let mut scanning = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        scanning.remove(&self.backend_id);
    }
}

pub struct SyncCoordinator {
    store: Arc<dyn CatalogStore>,
    oracle: ApprovalOracle,
    event_bus: Option<EventBus>,
    settings: SyncSettings,
    active_scans: Arc<StdMutex<HashSet<BackendId>>>,
    catalog_lock: Arc<RwLock<()>>,
    downloads: Arc<DownloadManager>,
}

impl SyncCoordinator {
    /// Approvals read versions from `store` unless another lookup is set.
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        let lookup = Arc::new(StoreVersionLookup::new(Arc::clone(&store)));
        let catalog_lock = Arc::new(RwLock::new(()));
        let downloads = Arc::new(DownloadManager::new(Arc::clone(&store), Arc::clone(&catalog_lock)));
        Self {
            store,
            oracle: ApprovalOracle::new(lookup),
            event_bus: None,
            settings: SyncSettings::default(),
            active_scans: Arc::new(StdMutex::new(HashSet::new())),
            catalog_lock,
            downloads,
        }
    }

    pub fn with_version_lookup(mut self, lookup: Arc<dyn VersionLookup>) -> Self {
        self.oracle = ApprovalOracle::new(lookup);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.downloads = Arc::new(
            DownloadManager::new(Arc::clone(&self.store), Arc::clone(&self.catalog_lock))
                .with_event_bus(event_bus.clone()),
        );
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// The single download manager sharing this coordinator's store, lock
    /// and bus. Every caller gets the same instance, so in-flight fetches are
    /// deduplicated across callers.
    pub fn download_manager(&self) -> Arc<DownloadManager> {
        Arc::clone(&self.downloads)
    }

    pub fn is_scanning(&self, backend_id: &BackendId) -> bool {
        self.active_scans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(backend_id)
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }

    pub async fn sync_backend(&self, backend: Arc<dyn Backend>) -> SyncOutcome {
        self.sync_backend_with_exemptions(backend, HashSet::new()).await
    }

    /// Run one pass. Containers in `exempt`, their sub-trees and their
    /// ancestors survive pruning whatever the scan reports.
    #[instrument(skip(self, backend, exempt), fields(backend_id = %backend.id()))]
    pub async fn sync_backend_with_exemptions(
        &self,
        backend: Arc<dyn Backend>,
        exempt: HashSet<String>,
    ) -> SyncOutcome {
        let backend_id = backend.id().clone();
        let Some(_guard) = ScanGuard::acquire(&self.active_scans, &backend_id) else {
            info!("Pass already running, skipping");
            self.emit(CoreEvent::Sync(SyncEvent::Skipped {
                backend_id: backend_id.to_string(),
            }));
            return SyncOutcome::Skipped { backend_id };
        };

        let pass_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(pass_id = %pass_id, "Sync pass started");
        self.emit(CoreEvent::Sync(SyncEvent::Started {
            pass_id: pass_id.clone(),
            backend_id: backend_id.to_string(),
        }));

        let session = Arc::new(ScanSession::new(
            backend_id.clone(),
            Arc::clone(&self.store),
            self.oracle.clone(),
        ));
        let scan_result = backend.scan(Arc::clone(&session) as Arc<dyn ScanSink>).await;
        let mut summary = session.finish().await;

        let abort = match scan_result {
            Err(e) => Some((e.to_string(), e.is_recoverable())),
            Ok(()) if summary.root_failed => Some(("backend root could not be listed".to_string(), true)),
            Ok(()) => None,
        };

        if abort.is_some() {
            // Anything listed this pass may be missing children; list it again.
            let found = summary.observation.found_containers.clone();
            summary.stale_containers.extend(found);
        }
        if let Err(e) = self.invalidate_versions(&summary.stale_containers).await {
            warn!(error = %e, "Could not clear versions of failed containers");
        }

        let mut prune_error = None;
        let plan = match &abort {
            Some((message, _)) => {
                warn!(pass_id = %pass_id, error = %message, "Scan failed, skipping prune");
                PrunePlan::default()
            }
            None => match self.prune(&backend_id, &summary, &exempt).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(pass_id = %pass_id, error = %e, "Prune failed");
                    prune_error = Some(e.to_string());
                    PrunePlan::default()
                }
            },
        };

        let (grouping, grouping_error) = match self.rebuild_grouping().await {
            Ok(summary) => (Some(summary), None),
            Err(e) => {
                error!(pass_id = %pass_id, error = %e, "Grouping rebuild failed");
                (None, Some(e.to_string()))
            }
        };

        let status = match abort {
            Some((message, recoverable)) => PassStatus::Aborted { message, recoverable },
            None if !summary.failures.is_empty()
                || summary.stats.ingest_failures > 0
                || prune_error.is_some() =>
            {
                PassStatus::Partial
            }
            None => PassStatus::Complete,
        };

        let report = SyncReport {
            pass_id,
            backend_id,
            status,
            stats: summary.stats,
            failures: summary.failures,
            songs_removed: plan.songs,
            containers_removed: plan.containers,
            grouping,
            grouping_error,
            duration: started.elapsed(),
        };
        self.publish(&report);

        info!(
            pass_id = %report.pass_id,
            status = ?report.status,
            songs_seen = report.stats.songs_seen(),
            songs_removed = report.songs_removed.len(),
            containers_removed = report.containers_removed.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Sync pass finished"
        );
        SyncOutcome::Completed(report)
    }

    /// Empty the stored version of each container and of its ancestors.
    async fn invalidate_versions(&self, containers: &HashSet<String>) -> Result<()> {
        let mut visited = HashSet::new();
        let mut writes = Vec::new();

        for id in containers {
            let mut cursor = Some(id.clone());
            while let Some(current) = cursor {
                if !visited.insert(current.clone()) {
                    break;
                }
                let Some(mut container) = self.store.find_container(&current).await? else {
                    break;
                };
                cursor = container.parent_id.clone();
                if !container.version_id.is_empty() {
                    container.version_id.clear();
                    writes.push(CatalogWrite::PutContainer(container));
                }
            }
        }

        if !writes.is_empty() {
            debug!(count = writes.len(), "Clearing container versions");
            self.store.transaction(writes).await?;
        }
        Ok(())
    }

    /// Plan and apply deletions. Returns what was actually deleted.
    async fn prune(
        &self,
        backend_id: &BackendId,
        summary: &SessionSummary,
        exempt: &HashSet<String>,
    ) -> Result<PrunePlan> {
        let _read = self.catalog_lock.read().await;

        let songs = self.store.find_songs(SongQuery::ByBackend(backend_id.clone())).await?;
        let containers = self
            .store
            .find_containers(ContainerQuery::ByBackend(backend_id.clone()))
            .await?;
        let plan = plan_prune(&songs, &containers, &summary.observation, exempt);
        if plan.is_empty() {
            return Ok(plan);
        }

        debug!(
            songs = plan.songs.len(),
            containers = plan.containers.len(),
            "Applying prune plan"
        );
        let songs = self
            .delete_in_batches(plan.songs, CatalogWrite::DeleteSong)
            .await;
        let containers = self
            .delete_in_batches(plan.containers, CatalogWrite::DeleteContainer)
            .await;

        Ok(PrunePlan { songs, containers })
    }

    /// Delete ids in batches, retrying a failed batch one id at a time so a
    /// single rejected delete does not keep the rest alive.
    async fn delete_in_batches(
        &self,
        ids: Vec<String>,
        to_write: fn(String) -> CatalogWrite,
    ) -> Vec<String> {
        let mut deleted = Vec::with_capacity(ids.len());

        for batch in ids.chunks(self.settings.prune_batch_size.max(1)) {
            let writes = batch.iter().cloned().map(to_write).collect();
            match self.store.transaction(writes).await {
                Ok(()) => deleted.extend_from_slice(batch),
                Err(e) => {
                    warn!(error = %e, size = batch.len(), "Prune batch rejected, retrying individually");
                    for id in batch {
                        match self.store.transaction(vec![to_write(id.clone())]).await {
                            Ok(()) => deleted.push(id.clone()),
                            Err(e) => warn!(id = %id, error = %e, "Could not prune entity"),
                        }
                    }
                }
            }
        }
        deleted
    }

    /// Recompute albums and artists from every stored song.
    pub async fn rebuild_grouping(&self) -> Result<GroupingSummary> {
        let _write = self.catalog_lock.write().await;
        let summary = rebuild_grouping(self.store.as_ref()).await?;
        self.emit(CoreEvent::Library(LibraryEvent::GroupingRebuilt {
            albums: summary.albums as u64,
            artists: summary.artists as u64,
        }));
        Ok(summary)
    }

    fn publish(&self, report: &SyncReport) {
        if self.event_bus.is_none() {
            return;
        }

        if !report.songs_removed.is_empty() {
            self.emit(CoreEvent::Library(LibraryEvent::SongsRemoved {
                song_ids: report.songs_removed.clone(),
            }));
        }
        if !report.containers_removed.is_empty() {
            self.emit(CoreEvent::Library(LibraryEvent::ContainersRemoved {
                container_ids: report.containers_removed.clone(),
            }));
        }

        let pass_id = report.pass_id.clone();
        let backend_id = report.backend_id.to_string();
        let event = match &report.status {
            PassStatus::Complete => SyncEvent::Completed {
                pass_id,
                backend_id,
                songs_seen: report.stats.songs_seen(),
                containers_seen: report.stats.containers_seen(),
                songs_removed: report.songs_removed.len() as u64,
                containers_removed: report.containers_removed.len() as u64,
                duration_ms: report.duration.as_millis() as u64,
            },
            PassStatus::Partial => SyncEvent::Partial {
                pass_id,
                backend_id,
                failed_containers: report.failures.len() as u64,
                songs_removed: report.songs_removed.len() as u64,
                containers_removed: report.containers_removed.len() as u64,
            },
            PassStatus::Aborted { message, recoverable } => SyncEvent::Failed {
                pass_id,
                backend_id,
                message: message.clone(),
                recoverable: *recoverable,
            },
        };
        self.emit(CoreEvent::Sync(event));
    }
}
