//! # Google Drive Provider
//!
//! Backend over a Google Drive folder, using the Drive v3 REST API through the
//! host's `HttpClient`.
//!
//! ## Overview
//!
//! - Folders are listed page by page with retry and exponential backoff
//! - Song versions are the content MD5, falling back to the modification time
//! - FLAC headers are read from a streaming download that is dropped as soon
//!   as the metadata blocks are decoded
//! - Fetched songs are cached under `<cache_dir>/<backend_id>/`; eviction
//!   deletes the cached file

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

pub use backend::GoogleDriveBackend;
pub use client::{DriveClient, DRIVE_API_BASE};
pub use error::{GoogleDriveError, Result};
pub use types::DriveFile;
