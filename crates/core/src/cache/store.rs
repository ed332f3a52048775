//! Lookup-or-miss orchestration over the cache index.
//!
//! The protocol is two-phase: `get_or_miss`, then (on a miss) the caller runs
//! the transform outside any lock and calls `register`. Two concurrent misses
//! for the same key may both compute; only the first registration is kept.

use std::path::{Path, PathBuf};

use super::connection::CacheIndex;
use super::entries::{CacheEntry, InsertOutcome};
use super::hash::{Fingerprint, fingerprint_file};
use super::method::Method;
use crate::Error;
use crate::pool::BlockingPool;

/// Result of [`CacheStore::get_or_miss`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// A live artifact exists; use `entry.processed_path` as-is.
    Hit(CacheEntry),
    /// Nothing cached. Carries the input's fingerprint so the caller can
    /// register without hashing again.
    Miss(Fingerprint),
}

/// Content-addressed front end for processed videos.
#[derive(Clone, Debug)]
pub struct CacheStore {
    index: CacheIndex,
    processed_root: PathBuf,
}

impl CacheStore {
    /// Blocking work runs on the index's pool, so the store adds no workers of its own.
    pub fn new(index: CacheIndex, processed_root: impl Into<PathBuf>) -> Self {
        Self { index, processed_root: processed_root.into() }
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn pool(&self) -> &BlockingPool {
        self.index.pool()
    }

    pub fn processed_root(&self) -> &Path {
        &self.processed_root
    }

    /// Hash `path` on the blocking pool.
    pub async fn fingerprint(&self, path: impl AsRef<Path>) -> Result<Fingerprint, Error> {
        let path = path.as_ref().to_path_buf();
        self.pool().run(move || fingerprint_file(path)).await
    }

    /// Check for a cached artifact of `input` processed with `method`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Io`] if the input cannot be read.
    pub async fn get_or_miss(&self, input: impl AsRef<Path>, method: Method) -> Result<Lookup, Error> {
        let fingerprint = self.fingerprint(input).await?;
        Ok(match self.index.lookup(&fingerprint, method).await? {
            Some(entry) => Lookup::Hit(entry),
            None => Lookup::Miss(fingerprint),
        })
    }

    /// Register a freshly computed artifact for `input`.
    pub async fn register(
        &self, input: impl AsRef<Path>, output: impl AsRef<Path>, method: Method,
    ) -> Result<InsertOutcome, Error> {
        let fingerprint = self.fingerprint(input.as_ref()).await?;
        self.register_fingerprint(&fingerprint, input, output, method).await
    }

    /// Register an artifact for an input whose fingerprint is already known.
    pub async fn register_fingerprint(
        &self, fingerprint: &Fingerprint, input: impl AsRef<Path>, output: impl AsRef<Path>, method: Method,
    ) -> Result<InsertOutcome, Error> {
        self.index.insert(fingerprint, method, input, output).await
    }

    /// Where the artifact for `(fingerprint, method)` lives under the processed root.
    ///
    /// Deterministic per key, so racing computations of the same key land on
    /// the same file.
    pub fn artifact_path(&self, fingerprint: &Fingerprint, method: Method, extension: Option<&str>) -> PathBuf {
        let mut name = format!("{fingerprint}_{method}");
        if let Some(ext) = extension.filter(|e| !e.is_empty()) {
            name.push('.');
            name.push_str(ext);
        }
        self.processed_root.join(name)
    }
}
