//! Core types and shared functionality for reelcache.
//!
//! This crate provides:
//! - Content-addressed cache of processed videos with a SQLite index
//! - TTL and size-budget retention for cached artifacts
//! - Scratch-directory cleanup and the periodic maintenance cycle
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod janitor;
pub mod maintenance;
pub mod pool;
pub mod workflow;

pub use cache::{CacheEntry, CacheIndex, CacheStore, Fingerprint, Lookup, Method};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use janitor::Janitor;
pub use maintenance::{CleanupReport, Maintenance};
pub use pool::BlockingPool;
pub use workflow::{Processed, Transform, process};
