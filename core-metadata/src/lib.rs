//! # Metadata Module
//!
//! Reads song metadata straight from FLAC byte streams.
//!
//! ## Overview
//!
//! This module handles:
//! - FLAC metadata block decoding over a bounds-checked byte cursor
//! - Resumable parsing of partially received streams
//! - Early-stopping reads from async sources (local files, HTTP bodies)
//! - Mapping Vorbis comments and stream info onto catalog songs

pub mod error;
pub mod flac;
pub mod tags;

pub use error::{MetadataError, Result};
pub use flac::{parse_flac_metadata, read_flac_metadata, FlacMetadata, FlacStreamParser};
pub use tags::SongTags;
