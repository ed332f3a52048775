//! SQLite-backed index of processed video artifacts.
//!
//! This module provides a persistent, content-addressed cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Content addressing using streamed SHA-256 fingerprints
//! - One entry per (fingerprint, method), never overwritten
//! - Self-healing lookups when an artifact vanished from disk
//! - TTL and total-size retention, oldest touch evicted first
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod entries;
pub mod hash;
pub mod method;
pub mod migrations;
pub mod retention;
pub mod store;

pub use crate::Error;

pub use connection::CacheIndex;
pub use entries::{CacheEntry, CacheStats, InsertOutcome};
pub use hash::{Fingerprint, fingerprint_file};
pub use method::Method;
pub use retention::{RetentionPolicy, SweepReport};
pub use store::{CacheStore, Lookup};
