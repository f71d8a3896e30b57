//! Workspace facade crate.
//!
//! Re-exports the service facade so host applications can depend on
//! `music-aggregator` and pick backends through features (`desktop-shims`,
//! `google-drive`) instead of wiring each workspace crate by hand. The
//! `flac-only` feature exposes just the FLAC metadata parser.

#[cfg(any(feature = "desktop-shims", feature = "google-drive"))]
pub use core_service::*;

#[cfg(feature = "flac-only")]
pub use core_metadata::flac;
