//! # Core Configuration Module
//!
//! Builder-based configuration holding every injected capability and tunable
//! the aggregator needs.
//!
//! ## Capabilities
//!
//! - `HttpClient` - remote backends (desktop default: reqwest)
//! - `FileSystemAccess` - local backend and offline cache (desktop default: tokio fs)
//!
//! Without the `desktop-shims` feature both must be injected; `build()`
//! reports which one is missing.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/home/ana/.local/share/aggregator/catalog.db")
//!     .cache_dir("/home/ana/.cache/aggregator")
//!     .sync_settings(SyncSettings::default().with_max_concurrent_scans(8))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{FileSystemAccess, HttpClient};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Default parallelism for backend directory listings.
pub const DEFAULT_MAX_CONCURRENT_SCANS: usize = 4;
pub const DEFAULT_FLAC_CHUNK_SIZE: usize = 16 * 1024;
/// Streams whose metadata runs past this are abandoned.
pub const DEFAULT_MAX_FLAC_HEADER_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_PRUNE_BATCH_SIZE: usize = 500;

/// Tunables for scanning and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub max_concurrent_scans: usize,
    /// Read size used when pulling FLAC headers from a stream.
    pub flac_chunk_size: usize,
    pub max_flac_header_bytes: usize,
    /// Deletes per prune transaction.
    pub prune_batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_scans: DEFAULT_MAX_CONCURRENT_SCANS,
            flac_chunk_size: DEFAULT_FLAC_CHUNK_SIZE,
            max_flac_header_bytes: DEFAULT_MAX_FLAC_HEADER_BYTES,
            prune_batch_size: DEFAULT_PRUNE_BATCH_SIZE,
        }
    }
}

impl SyncSettings {
    pub fn with_max_concurrent_scans(mut self, limit: usize) -> Self {
        self.max_concurrent_scans = limit;
        self
    }

    pub fn with_flac_chunk_size(mut self, size: usize) -> Self {
        self.flac_chunk_size = size;
        self
    }

    pub fn with_max_flac_header_bytes(mut self, limit: usize) -> Self {
        self.max_flac_header_bytes = limit;
        self
    }

    pub fn with_prune_batch_size(mut self, size: usize) -> Self {
        self.prune_batch_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_scans == 0 {
            return Err(Error::Config(
                "max_concurrent_scans must be greater than 0".to_string(),
            ));
        }
        if self.flac_chunk_size == 0 {
            return Err(Error::Config(
                "flac_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.max_flac_header_bytes < self.flac_chunk_size {
            return Err(Error::Config(format!(
                "max_flac_header_bytes ({}) is smaller than flac_chunk_size ({})",
                self.max_flac_header_bytes, self.flac_chunk_size
            )));
        }
        if self.prune_batch_size == 0 {
            return Err(Error::Config(
                "prune_batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validated configuration. Build with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite catalog file
    pub database_path: PathBuf,
    /// Downloaded songs are cached here
    pub cache_dir: PathBuf,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub event_buffer_size: usize,
    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("cache_dir", &self.cache_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("sync", &self.sync)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }
        self.sync.validate()
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient",
        message: "Inject an HttpClient with .http_client(), or enable the \
                  'desktop-shims' feature to use the reqwest client."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn default_file_system(cache_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::with_cache_directory(
        cache_dir.to_path_buf(),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_file_system(_cache_dir: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess",
        message: "Inject a FileSystemAccess with .file_system(), or enable the \
                  'desktop-shims' feature to use tokio::fs."
            .to_string(),
    })
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    event_buffer_size: Option<usize>,
    sync: SyncSettings,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => default_http_client()?,
        };
        let file_system = match self.file_system {
            Some(fs) => fs,
            None => default_file_system(&cache_dir)?,
        };

        let config = CoreConfig {
            database_path,
            cache_dir,
            http_client,
            file_system,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            sync: self.sync,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;
    use mockall::mock;
    use std::path::Path;
    use tokio::io::{AsyncRead, AsyncWrite};

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(
                &self,
                request: HttpRequest,
            ) -> BridgeResult<Box<dyn AsyncRead + Send + Unpin>>;
        }
    }

    mock! {
        Fs {}

        #[async_trait]
        impl FileSystemAccess for Fs {
            async fn get_cache_directory(&self) -> BridgeResult<PathBuf>;
            async fn exists(&self, path: &Path) -> BridgeResult<bool>;
            async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata>;
            async fn create_dir_all(&self, path: &Path) -> BridgeResult<()>;
            async fn read_file(&self, path: &Path) -> BridgeResult<Bytes>;
            async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()>;
            async fn delete_file(&self, path: &Path) -> BridgeResult<()>;
            async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>>;
            async fn open_read_stream(
                &self,
                path: &Path,
            ) -> BridgeResult<Box<dyn AsyncRead + Send + Unpin>>;
            async fn open_write_stream(
                &self,
                path: &Path,
            ) -> BridgeResult<Box<dyn AsyncWrite + Send + Unpin>>;
        }
    }

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(MockHttp::new()))
            .file_system(Arc::new(MockFs::new()))
    }

    #[test]
    fn test_builder_requires_database_path() {
        let err = injected().cache_dir("/cache").build().unwrap_err();
        assert!(err.to_string().contains("Database path is required"));
    }

    #[test]
    fn test_builder_requires_cache_dir() {
        let err = injected().database_path("/db/catalog.db").build().unwrap_err();
        assert!(err.to_string().contains("Cache directory is required"));
    }

    #[test]
    fn test_defaults_applied() {
        let config = injected()
            .database_path("/db/catalog.db")
            .cache_dir("/cache")
            .build()
            .unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.sync.max_concurrent_scans, 4);
        assert_eq!(config.sync.flac_chunk_size, 16 * 1024);
        assert_eq!(config.sync.max_flac_header_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = injected()
            .database_path("/db/catalog.db")
            .cache_dir("/cache")
            .sync_settings(SyncSettings::default().with_max_concurrent_scans(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_header_limit_must_cover_one_chunk() {
        let settings = SyncSettings::default()
            .with_flac_chunk_size(64 * 1024)
            .with_max_flac_header_bytes(1024);
        assert!(settings.validate().is_err());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_http_client_names_capability() {
        let err = CoreConfig::builder()
            .database_path("/db/catalog.db")
            .cache_dir("/cache")
            .file_system(Arc::new(MockFs::new()))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityMissing {
                capability: "HttpClient",
                ..
            }
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_capabilities() {
        let config = CoreConfig::builder()
            .database_path("/db/catalog.db")
            .cache_dir(std::env::temp_dir().join("aggregator-config-test"))
            .build()
            .unwrap();
        assert!(format!("{:?}", config).contains("HttpClient"));
    }
}
