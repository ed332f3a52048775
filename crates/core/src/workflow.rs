//! Processing driven through the cache.
//!
//! [`process`] is the full request path: fingerprint the upload, serve a hit,
//! otherwise run the [`Transform`] and publish its output into the processed
//! root before registering it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Error;
use crate::cache::{CacheStore, InsertOutcome, Lookup, Method};

/// A video transformation. Implementations write their output anywhere
/// (usually the temp root) and return its path.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self, input: &Path, method: Method) -> Result<PathBuf, Error>;
}

/// Where the processed video ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub path: PathBuf,
    /// True if served from the cache without running the transform.
    pub cached: bool,
}

/// Serve `input` processed with `method`, computing it on a miss.
///
/// On a miss the transform output is moved to the key's artifact path and
/// registered. If another caller registered the key first, this output is
/// discarded and the indexed artifact returned. If registration fails, the
/// output goes back to where the transform wrote it and is returned uncached,
/// so nothing unindexed is left in the processed root.
///
/// # Errors
///
/// Fails if the input cannot be read, the transform fails, its output cannot
/// be moved, or the artifact is gone by the time it would be served (for
/// example, evicted by the sweep that follows registration because it alone
/// exceeds the size budget).
pub async fn process<T>(store: &CacheStore, transform: &T, input: &Path, method: Method) -> Result<Processed, Error>
where
    T: Transform + ?Sized,
{
    let fingerprint = match store.get_or_miss(input, method).await? {
        Lookup::Hit(entry) => return Ok(Processed { path: entry.processed_path, cached: true }),
        Lookup::Miss(fingerprint) => fingerprint,
    };

    let produced = transform.transform(input, method).await?;
    let extension = produced.extension().and_then(|e| e.to_str()).map(str::to_owned);
    let destination = store.artifact_path(&fingerprint, method, extension.as_deref());

    let from = produced.clone();
    let to = destination.clone();
    store.pool().run(move || move_file(&from, &to)).await?;

    let indexed = match store.register_fingerprint(&fingerprint, input, &destination, method).await {
        Ok(InsertOutcome::Inserted) => {
            tracing::debug!(hash = %fingerprint, %method, path = %destination.display(), "registered new artifact");
            Some(destination.clone())
        }
        Ok(InsertOutcome::AlreadyExists) => match store.index().peek(&fingerprint, method).await {
            Ok(entry) => {
                tracing::debug!(hash = %fingerprint, %method, "artifact registered concurrently");
                entry.map(|e| e.processed_path)
            }
            Err(e) => {
                tracing::warn!(
                    hash = %fingerprint,
                    %method,
                    error = %e,
                    "could not read concurrently registered entry"
                );
                None
            }
        },
        Ok(InsertOutcome::MissingArtifact) => {
            tracing::warn!(
                hash = %fingerprint,
                %method,
                path = %destination.display(),
                "artifact vanished before registration"
            );
            return Err(Error::TransformFailed(format!(
                "artifact {} vanished before registration",
                destination.display()
            )));
        }
        Err(e) => {
            tracing::warn!(hash = %fingerprint, %method, error = %e, "could not register artifact");
            None
        }
    };

    match indexed {
        Some(path) if path == destination => {
            let check = destination.clone();
            if !store.pool().run(move || Ok(check.is_file())).await? {
                return Err(Error::TransformFailed(format!(
                    "artifact for {fingerprint} ({method}) was evicted before it could be served"
                )));
            }
            Ok(Processed { path: destination, cached: false })
        }
        Some(winner) => {
            let ours = destination.clone();
            store
                .pool()
                .run(move || {
                    discard(&ours);
                    Ok(())
                })
                .await?;
            Ok(Processed { path: winner, cached: false })
        }
        None => {
            let to = produced.clone();
            store.pool().run(move || move_file(&destination, &to)).await?;
            Ok(Processed { path: produced, cached: false })
        }
    }
}

/// Rename `from` to `to`, copying across filesystems when rename can't.
fn move_file(from: &Path, to: &Path) -> Result<(), Error> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| Error::io(from, e))?;
    discard(from);
    Ok(())
}

/// Best-effort delete; failures are only logged.
fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove unindexed artifact"),
    }
}
