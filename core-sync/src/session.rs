//! Per-pass [`ScanSink`] that ingests what a backend reports and records
//! what was observed for pruning.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use core_library::{BackendId, CatalogStore, Container, Song};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::approval::{ApprovalOracle, EntityKind};
use crate::backend::{FailedScope, ScanSink};
use crate::error::SyncError;
use crate::ingest::{ingest_container, ingest_song, IngestOutcome};
use crate::prune::PassObservation;

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub songs_inserted: u64,
    pub songs_updated: u64,
    pub songs_unchanged: u64,
    pub songs_skipped: u64,
    pub containers_inserted: u64,
    pub containers_updated: u64,
    pub containers_unchanged: u64,
    pub containers_skipped: u64,
    /// Entities the store refused; logged and left out.
    pub ingest_failures: u64,
}

impl PassStats {
    pub fn songs_seen(&self) -> u64 {
        self.songs_inserted + self.songs_updated + self.songs_unchanged + self.songs_skipped
    }

    pub fn containers_seen(&self) -> u64 {
        self.containers_inserted
            + self.containers_updated
            + self.containers_unchanged
            + self.containers_skipped
    }
}

/// A failure reported by the backend during the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub scope: FailedScope,
    pub message: String,
}

#[derive(Debug, Default)]
pub(crate) struct SessionSummary {
    pub observation: PassObservation,
    pub stats: PassStats,
    pub failures: Vec<ScanFailure>,
    pub root_failed: bool,
    /// Containers whose stored version no longer vouches for their sub-tree.
    pub stale_containers: HashSet<String>,
}

pub(crate) struct ScanSession {
    backend_id: BackendId,
    store: Arc<dyn CatalogStore>,
    oracle: ApprovalOracle,
    // Serialises find-then-write ingestion so placeholder parents never
    // overwrite a container ingested concurrently.
    ingest_lock: Mutex<()>,
    summary: Mutex<SessionSummary>,
}

impl ScanSession {
    pub fn new(backend_id: BackendId, store: Arc<dyn CatalogStore>, oracle: ApprovalOracle) -> Self {
        Self {
            backend_id,
            store,
            oracle,
            ingest_lock: Mutex::new(()),
            summary: Mutex::new(SessionSummary::default()),
        }
    }

    pub async fn finish(&self) -> SessionSummary {
        std::mem::take(&mut *self.summary.lock().await)
    }

    fn owns(&self, backend_id: &BackendId, kind: EntityKind, id: &str) -> bool {
        if backend_id == &self.backend_id {
            return true;
        }
        warn!(
            backend_id = %self.backend_id,
            reported_backend = %backend_id,
            entity = kind.as_str(),
            id,
            "Backend reported an entity it does not own, ignoring"
        );
        false
    }
}

#[async_trait]
impl ScanSink for ScanSession {
    async fn approve_container(&self, container_id: &str, version_id: &str) -> bool {
        let approved = self
            .oracle
            .approve(EntityKind::Container, container_id, version_id)
            .await;
        if !approved {
            let mut summary = self.summary.lock().await;
            if summary.observation.skipped_containers.insert(container_id.to_string()) {
                summary.stats.containers_skipped += 1;
            }
        }
        approved
    }

    async fn approve_song(&self, song_id: &str, version_id: &str) -> bool {
        let approved = self.oracle.approve(EntityKind::Song, song_id, version_id).await;
        if !approved {
            let mut summary = self.summary.lock().await;
            if summary.observation.skipped_songs.insert(song_id.to_string()) {
                summary.stats.songs_skipped += 1;
            }
        }
        approved
    }

    async fn handle_song(&self, song: Song) {
        if !self.owns(&song.backend_id, EntityKind::Song, &song.id) {
            return;
        }
        let song_id = song.id.clone();

        // Observed even if the write fails, so a store hiccup never prunes it.
        self.summary
            .lock()
            .await
            .observation
            .found_songs
            .insert(song_id.clone());

        let result = {
            let _guard = self.ingest_lock.lock().await;
            ingest_song(self.store.as_ref(), song).await
        };

        let mut summary = self.summary.lock().await;
        match result {
            Ok(IngestOutcome::Inserted) => summary.stats.songs_inserted += 1,
            Ok(IngestOutcome::Updated) => summary.stats.songs_updated += 1,
            Ok(IngestOutcome::Unchanged) => summary.stats.songs_unchanged += 1,
            Err(e) => {
                warn!(backend_id = %self.backend_id, song_id = %song_id, error = %e, "Failed to ingest song");
                summary.stats.ingest_failures += 1;
            }
        }
    }

    async fn handle_container(&self, container: Container) {
        if !self.owns(&container.backend_id, EntityKind::Container, &container.id) {
            return;
        }
        let container_id = container.id.clone();

        self.summary
            .lock()
            .await
            .observation
            .found_containers
            .insert(container_id.clone());

        let result = {
            let _guard = self.ingest_lock.lock().await;
            ingest_container(self.store.as_ref(), container).await
        };

        let mut summary = self.summary.lock().await;
        match result {
            Ok(IngestOutcome::Inserted) => summary.stats.containers_inserted += 1,
            Ok(IngestOutcome::Updated) => summary.stats.containers_updated += 1,
            Ok(IngestOutcome::Unchanged) => summary.stats.containers_unchanged += 1,
            Err(e) => {
                warn!(
                    backend_id = %self.backend_id,
                    container_id = %container_id,
                    error = %e,
                    "Failed to ingest container"
                );
                summary.stats.ingest_failures += 1;
            }
        }
    }

    async fn report_failure(&self, scope: FailedScope, error: SyncError) {
        warn!(backend_id = %self.backend_id, scope = ?scope, error = %error, "Scan failure reported");

        let mut summary = self.summary.lock().await;
        match &scope {
            FailedScope::Root => summary.root_failed = true,
            FailedScope::Container {
                container_id,
                parent_container_id,
            } => {
                summary.observation.failed_containers.insert(container_id.clone());
                summary.stale_containers.insert(container_id.clone());
                summary.stale_containers.extend(parent_container_id.clone());
            }
            FailedScope::Song {
                song_id,
                parent_container_id,
            } => {
                summary.observation.failed_songs.insert(song_id.clone());
                if let Some(parent) = parent_container_id {
                    summary.stale_containers.insert(parent.clone());
                }
            }
        }
        debug!(failures = summary.failures.len() + 1, "Recorded scan failure");
        summary.failures.push(ScanFailure {
            scope,
            message: error.to_string(),
        });
    }
}
