//! TTL and size-budget eviction.
//!
//! A sweep plans its victims from a snapshot of the index, unlinks their
//! artifacts on the blocking pool, then removes their rows in one transaction.
//! Rows are removed even when unlinking fails: a leaked file is preferable to
//! an index row pointing at something unreliable.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

use super::connection::CacheIndex;
use super::entries::{from_epoch, to_epoch};
use super::method::Method;
use crate::Error;

/// Default time-to-live: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Default size budget: 10 GiB.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// How long entries live and how much disk they may use in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub ttl: Duration,
    pub max_size_bytes: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, max_size_bytes: DEFAULT_MAX_SIZE_BYTES }
    }
}

/// Why an entry was selected for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reason {
    Expired,
    OverBudget,
}

/// An index row as seen by the planner.
///
/// `stamp` is the raw stored timestamp so the row delete can check it
/// wasn't touched in the meantime.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub hash: String,
    pub method: Method,
    pub processed_path: PathBuf,
    pub stamp: f64,
    pub size: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SweepReport {
    /// Rows removed because they outlived the TTL.
    pub expired: u64,
    /// Rows removed to bring the total under the size budget.
    pub evicted: u64,
    /// Artifact files actually unlinked.
    pub files_deleted: u64,
    /// Artifact files that could not be unlinked (rows were still removed).
    pub file_errors: u64,
    /// Sum of recorded sizes of removed rows.
    pub bytes_freed: u64,
}

/// Select victims from `candidates`, which must be ordered oldest first.
///
/// Everything touched before `cutoff` expires. Of the rest, the oldest are
/// evicted one at a time while the remaining total exceeds `budget`.
pub(crate) fn plan_eviction(candidates: Vec<Candidate>, cutoff: f64, budget: u64) -> Vec<(Candidate, Reason)> {
    let (expired, live): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| c.stamp < cutoff);

    let mut total: u64 = live.iter().map(|c| c.size).sum();
    let mut victims: Vec<_> = expired.into_iter().map(|c| (c, Reason::Expired)).collect();

    for candidate in live {
        if total <= budget {
            break;
        }
        total = total.saturating_sub(candidate.size);
        victims.push((candidate, Reason::OverBudget));
    }

    victims
}

/// Unlink an artifact. Returns `Ok(false)` if it was already gone.
fn remove_artifact(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl CacheIndex {
    /// Enforce the retention policy as of now.
    pub async fn sweep(&self) -> Result<SweepReport, Error> {
        self.sweep_at(Utc::now()).await
    }

    /// Enforce the retention policy as of `now`.
    ///
    /// Runs to completion once started.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, Error> {
        let ttl = chrono::Duration::from_std(self.policy.ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = to_epoch(now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC));
        let budget = self.policy.max_size_bytes;

        let candidates = self
            .conn
            .call(|conn| -> Result<Vec<Candidate>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT hash, method, processed_path, timestamp, size FROM cache ORDER BY timestamp ASC, rowid ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(Candidate {
                        hash: row.get(0)?,
                        method: row.get(1)?,
                        processed_path: PathBuf::from(row.get::<_, String>(2)?),
                        stamp: row.get(3)?,
                        size: row.get::<_, i64>(4)?.max(0) as u64,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)?;

        let victims = plan_eviction(candidates, cutoff, budget);
        if victims.is_empty() {
            return Ok(SweepReport::default());
        }

        let outcomes = self
            .pool
            .run(move || {
                let outcomes = victims
                    .into_iter()
                    .map(|(victim, reason)| {
                        let unlinked = match remove_artifact(&victim.processed_path) {
                            Ok(deleted) => Some(deleted),
                            Err(e) => {
                                tracing::warn!(
                                    path = %victim.processed_path.display(),
                                    reason = ?reason,
                                    error = %e,
                                    "could not delete evicted artifact; dropping its index row anyway"
                                );
                                None
                            }
                        };
                        (victim, reason, unlinked)
                    })
                    .collect::<Vec<_>>();
                Ok(outcomes)
            })
            .await?;

        let mut report = SweepReport::default();
        let mut keys = Vec::with_capacity(outcomes.len());
        for (victim, reason, unlinked) in outcomes {
            match reason {
                Reason::Expired => report.expired += 1,
                Reason::OverBudget => report.evicted += 1,
            }
            match unlinked {
                Some(true) => report.files_deleted += 1,
                Some(false) => {}
                None => report.file_errors += 1,
            }
            report.bytes_freed += victim.size;
            // The file is still on disk after a failed unlink, so the row goes
            // even if it was touched meanwhile.
            let guard = unlinked.map(|_| victim.stamp);
            keys.push((victim.hash, victim.method, guard));
        }

        let removed = self.remove_planned_rows(keys).await?;

        tracing::info!(
            expired = report.expired,
            evicted = report.evicted,
            files_deleted = report.files_deleted,
            file_errors = report.file_errors,
            bytes_freed = report.bytes_freed,
            rows_removed = removed,
            cutoff = %from_epoch(cutoff),
            "cache retention sweep finished"
        );

        Ok(report)
    }

    /// Delete planned rows in one transaction.
    ///
    /// A key carrying a timestamp is only deleted if the row still has it; a
    /// row touched since planning is left in place and, if its file was
    /// already unlinked, the next lookup purges it. Keys without a timestamp
    /// are deleted unconditionally.
    async fn remove_planned_rows(&self, keys: Vec<(String, Method, Option<f64>)>) -> Result<usize, Error> {
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut guarded =
                        tx.prepare("DELETE FROM cache WHERE hash = ?1 AND method = ?2 AND timestamp = ?3")?;
                    let mut unguarded = tx.prepare("DELETE FROM cache WHERE hash = ?1 AND method = ?2")?;
                    for (hash, method, stamp) in &keys {
                        removed += match stamp {
                            Some(stamp) => guarded.execute(params![hash, method, stamp])?,
                            None => unguarded.execute(params![hash, method])?,
                        };
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entries::tests::{fixture, open_index};
    use chrono::Duration as ChronoDuration;

    fn candidate(name: &str, stamp: f64, size: u64) -> Candidate {
        Candidate {
            hash: name.to_string(),
            method: Method::Crocodile,
            processed_path: PathBuf::from(name),
            stamp,
            size,
        }
    }

    fn names(victims: &[(Candidate, Reason)]) -> Vec<(&str, Reason)> {
        victims.iter().map(|(c, r)| (c.hash.as_str(), *r)).collect()
    }

    #[test]
    fn test_plan_expired_only() {
        let plan = plan_eviction(vec![candidate("old", 10.0, 1), candidate("new", 50.0, 1)], 20.0, 100);
        assert_eq!(names(&plan), vec![("old", Reason::Expired)]);
    }

    #[test]
    fn test_plan_budget_evicts_oldest_until_under() {
        let plan = plan_eviction(
            vec![candidate("a", 1.0, 40), candidate("b", 2.0, 40), candidate("c", 3.0, 40)],
            0.0,
            80,
        );
        assert_eq!(names(&plan), vec![("a", Reason::OverBudget)]);
    }

    #[test]
    fn test_plan_budget_counts_only_unexpired() {
        let plan = plan_eviction(
            vec![candidate("x", 1.0, 500), candidate("a", 5.0, 60), candidate("b", 6.0, 60)],
            2.0,
            100,
        );
        assert_eq!(names(&plan), vec![("x", Reason::Expired), ("a", Reason::OverBudget)]);
    }

    #[test]
    fn test_plan_nothing_to_do() {
        let plan = plan_eviction(vec![candidate("a", 5.0, 10)], 1.0, 10);
        assert!(plan.is_empty());
    }

    fn small_ttl_policy() -> RetentionPolicy {
        RetentionPolicy { ttl: Duration::from_secs(3600), max_size_bytes: u64::MAX }
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(small_ttl_policy()).await;
        let (fp_old, in_old, art_old) = fixture(dir.path(), "old", 10);
        let (fp_young, in_young, art_young) = fixture(dir.path(), "young", 10);
        index.insert(&fp_old, Method::Crocodile, &in_old, &art_old).await.unwrap();
        index.insert(&fp_young, Method::Crocodile, &in_young, &art_young).await.unwrap();

        let now = Utc::now();
        index.set_touched_at(&fp_old, Method::Crocodile, now - ChronoDuration::seconds(3601)).await;
        index.set_touched_at(&fp_young, Method::Crocodile, now - ChronoDuration::seconds(3599)).await;

        let report = index.sweep_at(now).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(report.files_deleted, 1);

        assert!(!art_old.exists());
        assert!(art_young.exists());
        assert!(index.peek(&fp_old, Method::Crocodile).await.unwrap().is_none());
        assert!(index.peek(&fp_young, Method::Crocodile).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_budget_evicts_single_oldest() {
        let dir = tempfile::tempdir().unwrap();
        // Unbounded while inserting so the insert-triggered sweep stays out of the way.
        let loose = open_index(RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: u64::MAX }).await;
        let (fp_a, in_a, art_a) = fixture(dir.path(), "a", 400);
        let (fp_b, in_b, art_b) = fixture(dir.path(), "b", 400);
        let (fp_c, in_c, art_c) = fixture(dir.path(), "c", 400);
        loose.insert(&fp_a, Method::Dolphin, &in_a, &art_a).await.unwrap();
        loose.insert(&fp_b, Method::Dolphin, &in_b, &art_b).await.unwrap();
        loose.insert(&fp_c, Method::Dolphin, &in_c, &art_c).await.unwrap();

        let now = Utc::now();
        loose.set_touched_at(&fp_a, Method::Dolphin, now - ChronoDuration::minutes(30)).await;
        loose.set_touched_at(&fp_b, Method::Dolphin, now - ChronoDuration::minutes(20)).await;
        loose.set_touched_at(&fp_c, Method::Dolphin, now - ChronoDuration::minutes(10)).await;

        let index = CacheIndex { policy: RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: 1000 }, ..loose };
        let report = index.sweep_at(now).await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.bytes_freed, 400);

        assert!(!art_a.exists());
        assert!(art_b.exists() && art_c.exists());
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.entry_count, 2);
        assert!(stats.total_size_bytes <= 1000);
    }

    #[tokio::test]
    async fn test_touch_protects_from_budget_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let loose = open_index(RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: u64::MAX }).await;
        let (fp_1, in_1, art_1) = fixture(dir.path(), "e1", 300);
        let (fp_2, in_2, art_2) = fixture(dir.path(), "e2", 300);
        loose.insert(&fp_1, Method::Grizzly, &in_1, &art_1).await.unwrap();
        loose.insert(&fp_2, Method::Grizzly, &in_2, &art_2).await.unwrap();
        loose.set_touched_at(&fp_1, Method::Grizzly, Utc::now() - ChronoDuration::minutes(20)).await;
        loose.set_touched_at(&fp_2, Method::Grizzly, Utc::now() - ChronoDuration::minutes(10)).await;

        // Hit E1 so it becomes the most recent.
        loose.lookup(&fp_1, Method::Grizzly).await.unwrap().unwrap();

        let index = CacheIndex { policy: RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: 500 }, ..loose };
        let report = index.sweep().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(index.peek(&fp_1, Method::Grizzly).await.unwrap().is_some());
        assert!(index.peek(&fp_2, Method::Grizzly).await.unwrap().is_none());
        assert!(art_1.exists());
        assert!(!art_2.exists());
    }

    #[tokio::test]
    async fn test_access_count_does_not_protect() {
        let dir = tempfile::tempdir().unwrap();
        let loose = open_index(RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: u64::MAX }).await;
        let (fp_hot, in_hot, art_hot) = fixture(dir.path(), "hot", 300);
        let (fp_cold, in_cold, art_cold) = fixture(dir.path(), "cold", 300);
        loose.insert(&fp_hot, Method::Crocodile, &in_hot, &art_hot).await.unwrap();
        loose.insert(&fp_cold, Method::Crocodile, &in_cold, &art_cold).await.unwrap();
        for _ in 0..5 {
            loose.lookup(&fp_hot, Method::Crocodile).await.unwrap();
        }
        // Heavily used but with the older timestamp.
        loose.set_touched_at(&fp_hot, Method::Crocodile, Utc::now() - ChronoDuration::minutes(20)).await;
        loose.set_touched_at(&fp_cold, Method::Crocodile, Utc::now() - ChronoDuration::minutes(10)).await;

        let index = CacheIndex { policy: RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: 500 }, ..loose };
        index.sweep().await.unwrap();
        assert!(index.peek(&fp_hot, Method::Crocodile).await.unwrap().is_none());
        assert!(index.peek(&fp_cold, Method::Crocodile).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_triggers_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(RetentionPolicy { ttl: DEFAULT_TTL, max_size_bytes: 500 }).await;
        let (fp_a, in_a, art_a) = fixture(dir.path(), "a", 300);
        let (fp_b, in_b, art_b) = fixture(dir.path(), "b", 300);
        index.insert(&fp_a, Method::Dolphin, &in_a, &art_a).await.unwrap();
        index.set_touched_at(&fp_a, Method::Dolphin, Utc::now() - ChronoDuration::minutes(1)).await;

        index.insert(&fp_b, Method::Dolphin, &in_b, &art_b).await.unwrap();

        assert!(index.peek(&fp_a, Method::Dolphin).await.unwrap().is_none());
        assert!(!art_a.exists());
        assert!(index.peek(&fp_b, Method::Dolphin).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_row_removed_when_file_cannot_be_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(small_ttl_policy()).await;
        let input = crate::cache::entries::tests::write_file(dir.path(), "clip.mp4", b"clip");
        let fp = crate::cache::hash::fingerprint_file(&input).unwrap();
        // A non-empty directory stands in for an artifact that refuses to unlink.
        let stubborn = dir.path().join("stubborn.mp4");
        std::fs::create_dir(&stubborn).unwrap();
        std::fs::write(stubborn.join("inner"), b"x").unwrap();
        let ordinary = dir.path().join("ordinary.mp4");
        std::fs::write(&ordinary, b"y").unwrap();
        index.insert(&fp, Method::Grizzly, &input, &ordinary).await.unwrap();

        index
            .conn
            .call({
                let hash = fp.as_str().to_string();
                let path = stubborn.to_str().unwrap().to_string();
                move |conn| {
                    conn.execute(
                        "UPDATE cache SET processed_path = ?2, timestamp = 0 WHERE hash = ?1",
                        params![hash, path],
                    )
                }
            })
            .await
            .unwrap();

        let report = index.sweep().await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.file_errors, 1);
        assert_eq!(report.files_deleted, 0);
        assert_eq!(index.stats().await.unwrap().entry_count, 0);
        assert!(stubborn.exists());
    }

    #[tokio::test]
    async fn test_touched_during_sweep_keeps_row() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(small_ttl_policy()).await;
        let (fp, input, artifact) = fixture(dir.path(), "clip", 10);
        index.insert(&fp, Method::Crocodile, &input, &artifact).await.unwrap();

        // Planned against a stale timestamp, as if a hit landed between
        // planning and deletion.
        let stale = to_epoch(Utc::now() - ChronoDuration::hours(2));
        let removed = index
            .remove_planned_rows(vec![(fp.as_str().to_string(), Method::Crocodile, Some(stale))])
            .await
            .unwrap();

        assert_eq!(removed, 0);
        assert!(index.peek(&fp, Method::Crocodile).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_unlink_drops_row_touched_during_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(small_ttl_policy()).await;
        let (fp, input, artifact) = fixture(dir.path(), "clip", 10);
        index.insert(&fp, Method::Dolphin, &input, &artifact).await.unwrap();

        // Touched after planning: a guarded delete would keep it, but its
        // artifact could not be unlinked so the key is unguarded.
        index.set_touched_at(&fp, Method::Dolphin, Utc::now()).await;
        let removed = index
            .remove_planned_rows(vec![(fp.as_str().to_string(), Method::Dolphin, None)])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(index.peek(&fp, Method::Dolphin).await.unwrap().is_none());
    }
}
