//! Insert-or-update of scanned songs and containers.

use core_library::{BackendId, CatalogStore, CatalogWrite, Container, DownloadState, Song};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Merge a freshly scanned song with the stored one.
///
/// Scanned metadata always wins. Local download state survives: it is kept
/// as-is for an unchanged version and moved through
/// [`DownloadState::after_upstream_change`] otherwise, so an in-flight
/// download is never lost to a metadata refresh.
pub fn reconcile_song(existing: Option<&Song>, incoming: Song) -> Song {
    let Some(stored) = existing else {
        return incoming;
    };

    let mut song = incoming;
    if song.local {
        return song;
    }

    if stored.version_id == song.version_id {
        song.download_state = stored.download_state;
    } else {
        song.download_state = stored.download_state.after_upstream_change();
    }

    if song.download_state == DownloadState::NotDownloaded {
        song.download_progress = 0.0;
        song.local_path = None;
    } else {
        song.download_progress = stored.download_progress;
        song.local_path = stored.local_path.clone();
    }
    song
}

/// Merge a freshly scanned container with the stored one.
///
/// A scan that does not name a parent keeps the stored link; linking is
/// idempotent because the link lives on the child.
pub fn reconcile_container(existing: Option<&Container>, incoming: Container) -> Container {
    let mut container = incoming;
    if let Some(stored) = existing {
        if container.parent_id.is_none() {
            container.parent_id = stored.parent_id.clone();
        }
    }
    container
}

pub async fn ingest_song(store: &dyn CatalogStore, song: Song) -> Result<IngestOutcome> {
    let existing = store.find_song(&song.id).await?;
    let merged = reconcile_song(existing.as_ref(), song);

    let outcome = match &existing {
        None => IngestOutcome::Inserted,
        Some(stored) if *stored == merged => return Ok(IngestOutcome::Unchanged),
        Some(_) => IngestOutcome::Updated,
    };

    let mut writes = Vec::with_capacity(2);
    if let Some(parent_id) = &merged.parent_container_id {
        writes.extend(placeholder_parent(store, parent_id, &merged.backend_id).await?);
    }
    writes.push(CatalogWrite::PutSong(merged));
    store.transaction(writes).await?;
    Ok(outcome)
}

pub async fn ingest_container(store: &dyn CatalogStore, container: Container) -> Result<IngestOutcome> {
    let existing = store.find_container(&container.id).await?;
    let merged = reconcile_container(existing.as_ref(), container);

    let outcome = match &existing {
        None => IngestOutcome::Inserted,
        Some(stored) if *stored == merged => return Ok(IngestOutcome::Unchanged),
        Some(_) => IngestOutcome::Updated,
    };

    let mut writes = Vec::with_capacity(2);
    if let Some(parent_id) = &merged.parent_id {
        writes.extend(placeholder_parent(store, parent_id, &merged.backend_id).await?);
    }
    writes.push(CatalogWrite::PutContainer(merged));
    store.transaction(writes).await?;
    Ok(outcome)
}

/// A versionless stand-in for a parent the backend has not emitted yet.
///
/// The empty version guarantees the real container is approved and
/// overwrites the placeholder when it arrives.
async fn placeholder_parent(
    store: &dyn CatalogStore,
    parent_id: &str,
    backend_id: &BackendId,
) -> Result<Option<CatalogWrite>> {
    if store.find_container(parent_id).await?.is_some() {
        return Ok(None);
    }
    Ok(Some(CatalogWrite::PutContainer(Container::new(
        parent_id,
        backend_id.clone(),
        parent_id,
        "",
    ))))
}
