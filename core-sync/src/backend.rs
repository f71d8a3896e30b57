//! # Backend Contract
//!
//! A backend owns one catalog partition (a local folder, a Drive account...)
//! and reports what it holds through a [`ScanSink`] supplied by the engine.
//!
//! ## Scan protocol
//!
//! For every container it is about to list, the backend asks
//! [`ScanSink::approve_container`] with the container's current version. When
//! the answer is `false` the whole sub-tree is left alone: nothing below it is
//! listed or re-emitted, and the engine keeps what it already has. When the
//! answer is `true` the backend emits the container, then its songs and child
//! containers. Songs go through [`ScanSink::approve_song`] before any metadata
//! is fetched; an unapproved song counts as observed.
//!
//! Container versions must change whenever anything below the container
//! changes. Backends that cannot provide such a token report an empty
//! version, which is always approved.
//!
//! Listing or read failures are reported through [`ScanSink::report_failure`]
//! and never abort sibling sub-trees. Returning `Err` from [`Backend::scan`]
//! marks the entire pass as unreliable and disables pruning.
//!
//! All sink methods may be called concurrently from parallel sub-scans.

use std::sync::Arc;

use async_trait::async_trait;
use core_library::{BackendId, Container, Song};

use crate::error::{Result, SyncError};

/// The part of a scan a failure applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailedScope {
    /// The backend root could not be listed.
    Root,
    /// A container could not be listed; its stored sub-tree is kept.
    Container {
        container_id: String,
        parent_container_id: Option<String>,
    },
    /// One song's metadata could not be read; the stored song is kept.
    Song {
        song_id: String,
        parent_container_id: Option<String>,
    },
}

/// Callbacks a backend drives while scanning.
#[async_trait]
pub trait ScanSink: Send + Sync {
    /// `true` when the container changed since the last pass and must be listed.
    async fn approve_container(&self, container_id: &str, version_id: &str) -> bool;

    /// `true` when the song changed since the last pass and must be re-read.
    async fn approve_song(&self, song_id: &str, version_id: &str) -> bool;

    async fn handle_song(&self, song: Song);

    /// Ingest a container; its `parent_id` is the link to the parent.
    async fn handle_container(&self, container: Container);

    async fn report_failure(&self, scope: FailedScope, error: SyncError);
}

/// Receives byte counts while a song is being fetched.
#[async_trait]
pub trait DownloadProgress: Send + Sync {
    async fn report(&self, bytes_downloaded: u64, total_bytes: Option<u64>);
}

/// No-op progress receiver.
pub struct IgnoreProgress;

#[async_trait]
impl DownloadProgress for IgnoreProgress {
    async fn report(&self, _bytes_downloaded: u64, _total_bytes: Option<u64>) {}
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn id(&self) -> &BackendId;

    /// Walk the backend and report everything through `sink`.
    async fn scan(&self, sink: Arc<dyn ScanSink>) -> Result<()>;

    /// Copy the song's bytes to local storage and return the local path.
    ///
    /// Catalog state transitions are handled by the caller.
    async fn fetch_song(&self, song: &Song, progress: &dyn DownloadProgress) -> Result<String>;

    /// Remove the cached copy written by [`Backend::fetch_song`].
    async fn evict_song(&self, song: &Song) -> Result<()>;
}
