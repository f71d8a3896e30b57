use core_library::LibraryError;
use core_metadata::MetadataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// A backend could not list, read or transfer something.
    #[error("Backend {backend_id} error: {message}")]
    Backend { backend_id: String, message: String },

    #[error("Backend {0} is not registered")]
    UnknownBackend(String),

    #[error("Song {0} not found")]
    SongNotFound(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl SyncError {
    pub fn backend(backend_id: impl ToString, message: impl Into<String>) -> Self {
        SyncError::Backend {
            backend_id: backend_id.to_string(),
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Backend { .. } | SyncError::Library(LibraryError::Database(_)) => true,
            SyncError::Metadata(err) => err.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
