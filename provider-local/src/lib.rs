//! # Local Folder Provider
//!
//! Backend over a directory on local storage.
//!
//! ## Overview
//!
//! - Walks the tree through the host's `FileSystemAccess`
//! - Directory versions are digests of everything below them, so an
//!   untouched sub-tree is skipped without reading a single file
//! - Song versions are size plus modification time
//! - FLAC headers are streamed and reading stops at the last metadata block
//! - Songs are `local` and always downloaded; eviction never deletes files

pub mod backend;
pub mod error;
mod walker;

pub use backend::LocalFolderBackend;
pub use error::{LocalBackendError, Result};
