//! Scratch-area cleanup.
//!
//! Downloads and transform outputs land in the temp root first. The janitor
//! deletes what has gone stale there by filesystem modification time and prunes
//! the empty directories left behind. It never consults the cache index; the
//! processed root is kept out of its reach by requiring the two roots to be
//! disjoint.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use walkdir::WalkDir;

use crate::Error;
use crate::pool::BlockingPool;

/// True if either path contains the other.
///
/// Paths are made absolute (and canonical where they exist) before comparing.
pub fn roots_overlap(a: &Path, b: &Path) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.starts_with(&b) || b.starts_with(&a)
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Sweeps the scratch directory tree.
#[derive(Clone, Debug)]
pub struct Janitor {
    temp_root: PathBuf,
    pool: BlockingPool,
}

impl Janitor {
    /// Create a janitor for `temp_root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `temp_root` and `processed_root`
    /// overlap, since the janitor would then delete cached artifacts.
    pub fn new(temp_root: impl Into<PathBuf>, processed_root: &Path, pool: BlockingPool) -> Result<Self, Error> {
        let temp_root = temp_root.into();
        if roots_overlap(&temp_root, processed_root) {
            return Err(Error::InvalidInput(format!(
                "temp root {} overlaps processed root {}",
                temp_root.display(),
                processed_root.display()
            )));
        }
        Ok(Self { temp_root, pool })
    }

    /// Delete regular files under the temp root last modified more than `max_age` ago.
    ///
    /// Returns how many were deleted. Files that can't be inspected or removed
    /// are logged and skipped.
    pub async fn clean_temp_files(&self, max_age: Duration) -> Result<u64, Error> {
        let root = self.temp_root.clone();
        let deleted = self.pool.run(move || Ok(remove_stale_files(&root, max_age, SystemTime::now()))).await?;
        tracing::info!(deleted, max_age_secs = max_age.as_secs(), "deleted stale temp files");
        Ok(deleted)
    }

    /// Remove empty directories under the temp root, deepest first.
    ///
    /// The root itself is kept. Returns how many directories were removed.
    pub async fn clean_empty_dirs(&self) -> Result<u64, Error> {
        let root = self.temp_root.clone();
        let removed = self.pool.run(move || Ok(remove_empty_dirs(&root))).await?;
        tracing::info!(removed, "removed empty temp directories");
        Ok(removed)
    }

    /// Delete the top-level scratch files belonging to `user_id`.
    ///
    /// Uploads are saved as `{user_id}_{name}`.
    pub async fn clean_user_files(&self, user_id: i64) -> Result<u64, Error> {
        let root = self.temp_root.clone();
        let prefix = format!("{user_id}_");
        let deleted = self
            .pool
            .run(move || {
                let entries = match std::fs::read_dir(&root) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
                    Err(e) => return Err(Error::io(&root, e)),
                };
                let mut deleted = 0u64;
                for entry in entries.filter_map(Result::ok) {
                    let path = entry.path();
                    let owned = entry.file_name().to_str().is_some_and(|name| name.starts_with(&prefix));
                    if !owned || !entry.file_type().is_ok_and(|t| t.is_file()) {
                        continue;
                    }
                    match std::fs::remove_file(&path) {
                        Ok(()) => deleted += 1,
                        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not delete user file"),
                    }
                }
                Ok(deleted)
            })
            .await?;
        tracing::info!(user_id, deleted, "deleted user temp files");
        Ok(deleted)
    }
}

fn remove_stale_files(root: &Path, max_age: Duration, now: SystemTime) -> u64 {
    if !root.exists() {
        return 0;
    }
    let mut deleted = 0;
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable temp entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "could not read modification time");
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => deleted += 1,
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "could not delete temp file"),
        }
    }
    deleted
}

fn remove_empty_dirs(root: &Path) -> u64 {
    if !root.exists() {
        return 0;
    }
    let mut removed = 0;
    // contents_first yields children before their parent, so a chain of
    // empty directories collapses in one pass.
    for entry in WalkDir::new(root).min_depth(1).contents_first(true).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let is_empty = match std::fs::read_dir(path) {
            Ok(mut children) => children.next().is_none(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read directory");
                continue;
            }
        };
        if !is_empty {
            continue;
        }
        match std::fs::remove_dir(path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove directory"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn backdate(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn janitor(temp: &Path) -> Janitor {
        let processed = temp.parent().unwrap().join("processed");
        Janitor::new(temp, &processed, BlockingPool::default()).unwrap()
    }

    #[tokio::test]
    async fn test_clean_temp_files_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp");
        fs::create_dir_all(temp.join("nested")).unwrap();
        let old = temp.join("old.mp4");
        let old_nested = temp.join("nested").join("old.part");
        let fresh = temp.join("fresh.mp4");
        for path in [&old, &old_nested, &fresh] {
            fs::write(path, b"x").unwrap();
        }
        backdate(&old, Duration::from_secs(48 * 3600));
        backdate(&old_nested, Duration::from_secs(25 * 3600));

        let deleted = janitor(&temp).clean_temp_files(Duration::from_secs(24 * 3600)).await.unwrap();

        assert_eq!(deleted, 2);
        assert!(!old.exists());
        assert!(!old_nested.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_clean_empty_dirs_bottom_up() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp");
        fs::create_dir_all(temp.join("a").join("b").join("c")).unwrap();
        fs::create_dir_all(temp.join("keep")).unwrap();
        fs::write(temp.join("keep").join("file.mp4"), b"x").unwrap();

        let removed = janitor(&temp).clean_empty_dirs().await.unwrap();

        assert_eq!(removed, 3);
        assert!(!temp.join("a").exists());
        assert!(temp.join("keep").exists());
        assert!(temp.exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let janitor = janitor(&dir.path().join("not-created"));
        assert_eq!(janitor.clean_temp_files(Duration::ZERO).await.unwrap(), 0);
        assert_eq!(janitor.clean_empty_dirs().await.unwrap(), 0);
        assert_eq!(janitor.clean_user_files(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clean_user_files() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp");
        fs::create_dir_all(&temp).unwrap();
        for name in ["42_a.mp4", "42_b.mov", "420_c.mp4", "7_d.mp4"] {
            fs::write(temp.join(name), b"x").unwrap();
        }

        let deleted = janitor(&temp).clean_user_files(42).await.unwrap();

        assert_eq!(deleted, 2);
        assert!(temp.join("420_c.mp4").exists());
        assert!(temp.join("7_d.mp4").exists());
    }

    #[test]
    fn test_overlapping_roots_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed");
        let nested = processed.join("tmp");

        assert!(Janitor::new(&nested, &processed, BlockingPool::default()).is_err());
        assert!(Janitor::new(dir.path(), &processed, BlockingPool::default()).is_err());
        assert!(Janitor::new(&processed, &processed, BlockingPool::default()).is_err());
        assert!(Janitor::new(dir.path().join("temp"), &processed, BlockingPool::default()).is_ok());
    }

    #[test]
    fn test_roots_overlap_is_component_wise() {
        assert!(!roots_overlap(Path::new("/srv/temp"), Path::new("/srv/temp_processed")));
        assert!(roots_overlap(Path::new("/srv/data"), Path::new("/srv/data/processed")));
    }
}
