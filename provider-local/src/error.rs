//! Error types for the local folder backend

use bridge_traits::error::BridgeError;
use core_library::BackendId;
use core_metadata::MetadataError;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalBackendError {
    #[error("File system error: {0}")]
    FileSystem(#[from] BridgeError),

    #[error("Unreadable FLAC metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Root {0} is not a directory")]
    InvalidRoot(String),

    #[error("Song {0} has no local file")]
    MissingFile(String),

    #[error("Scan aborted: {0}")]
    Aborted(String),
}

impl LocalBackendError {
    pub fn into_sync_error(self, backend_id: &BackendId) -> SyncError {
        match self {
            LocalBackendError::Metadata(err) => SyncError::Metadata(err),
            other => SyncError::backend(backend_id, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalBackendError>;
