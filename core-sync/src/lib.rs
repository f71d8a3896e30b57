//! # Sync & Reconciliation
//!
//! Keeps the catalog in line with what each backend holds.
//!
//! ## Overview
//!
//! A backend walks its namespace and reports containers and songs through a
//! [`ScanSink`]. The coordinator ingests what is reported, prunes what
//! disappeared, and rebuilds the album and artist groupings derived from the
//! song set.
//!
//! ## Components
//!
//! - **Backend contract** (`backend`): what a backend implements and the sink it drives
//! - **Approval** (`approval`): change detection against stored version tokens
//! - **Ingestion** (`ingest`): insert-or-update that preserves download state
//! - **Pruning** (`prune`): deletion planning that never touches unlisted sub-trees
//! - **Grouping** (`grouping`): album and artist rebuild
//! - **Sync Coordinator** (`coordinator`): one pass per backend, non-reentrant
//! - **Downloads** (`downloads`): fetch and evict with persisted state

pub mod approval;
pub mod backend;
pub mod coordinator;
pub mod downloads;
pub mod error;
pub mod grouping;
pub mod ingest;
pub mod prune;
mod session;

pub use approval::{ApprovalOracle, EntityKind, StoreVersionLookup, VersionLookup, VersionSnapshot};
pub use backend::{Backend, DownloadProgress, FailedScope, IgnoreProgress, ScanSink};
pub use coordinator::{PassStatus, SyncCoordinator, SyncOutcome, SyncReport};
pub use downloads::DownloadManager;
pub use error::{Result, SyncError};
pub use grouping::{compute_grouping, rebuild_grouping, GroupingSummary};
pub use ingest::IngestOutcome;
pub use prune::{plan_prune, PassObservation, PrunePlan};
pub use session::{PassStats, ScanFailure};
