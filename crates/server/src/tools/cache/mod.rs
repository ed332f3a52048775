//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and sweeping the cache index.

pub mod lookup;
pub mod stats;
pub mod sweep;

pub use lookup::{CacheLookupParams, lookup_impl};
pub use stats::stats_impl;
pub use sweep::sweep_impl;
