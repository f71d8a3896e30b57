//! Error types for Google Drive provider

use bridge_traits::error::BridgeError;
use core_library::BackendId;
use core_metadata::MetadataError;
use core_sync::SyncError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// Token rejected (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Still throttled or unavailable after every retry
    #[error("Rate limited or unavailable after {attempts} attempts (last status {status_code})")]
    RetriesExhausted { attempts: u32, status_code: u16 },

    #[error("File not found: {file_id}")]
    FileNotFound { file_id: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Unreadable FLAC metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Download ended after {written} of {expected} bytes")]
    IncompleteDownload { written: u64, expected: u64 },

    #[error("Scan aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl GoogleDriveError {
    pub fn from_status(status_code: u16, body: &[u8], file_id: &str) -> Self {
        match status_code {
            401 | 403 => GoogleDriveError::AuthenticationFailed(String::from_utf8_lossy(body).into_owned()),
            404 => GoogleDriveError::FileNotFound {
                file_id: file_id.to_string(),
            },
            _ => GoogleDriveError::ApiError {
                status_code,
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    pub fn into_sync_error(self, backend_id: &BackendId) -> SyncError {
        match self {
            GoogleDriveError::Metadata(err) => SyncError::Metadata(err),
            other => SyncError::backend(backend_id, other.to_string()),
        }
    }
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;
