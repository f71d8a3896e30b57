//! # Host Bridge Traits
//!
//! Capability contracts the core needs from its host platform.
//!
//! ## Overview
//!
//! Each trait is a capability that the core requires but that is implemented
//! differently per platform. Desktop implementations live in `bridge-desktop`;
//! mobile hosts inject their own.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry and streaming downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for the local backend and offline cache
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and include context such as paths or status codes.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{LogEntry, LogLevel, LoggerSink};
