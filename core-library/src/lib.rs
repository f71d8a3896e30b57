//! # Library Management Module
//!
//! Owns the aggregated catalog: songs and containers reported by backends,
//! plus the albums and artists derived from them.
//!
//! ## Overview
//!
//! This module provides:
//! - Domain models ([`Song`], [`Container`], [`Album`], [`Artist`], [`DownloadState`])
//! - The [`CatalogStore`] contract with atomic write batches
//! - An in-memory store and a SQLite store with embedded migrations
//! - The local [`PlayQueue`]

pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod queue;
pub mod sqlite;
pub mod store;

pub use error::{LibraryError, Result};
pub use memory::InMemoryCatalogStore;
pub use models::{Album, Artist, BackendId, Container, DownloadState, Song, ARTIST_DELIMITER};
pub use queue::PlayQueue;
pub use sqlite::SqliteCatalogStore;
pub use store::{CatalogStore, CatalogWrite, ContainerQuery, SongQuery};
