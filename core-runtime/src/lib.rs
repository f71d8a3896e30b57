//! # Core Runtime Module
//!
//! Runtime infrastructure shared by every other crate:
//! - Logging and tracing bootstrap
//! - Validated configuration with injected host capabilities
//! - The optional event bus used to observe sync passes and downloads

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, DownloadEvent, EventBus, EventStream, LibraryEvent, SyncEvent};
