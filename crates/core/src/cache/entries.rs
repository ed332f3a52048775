//! Cache entry operations: lookup with touch, insert, delete and stats.
//!
//! Every operation runs as one closure on the index connection's thread, so a
//! lookup's "check row, check file, touch" and an insert's uniqueness check are
//! each atomic with respect to all other index operations.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheIndex;
use super::hash::Fingerprint;
use super::method::Method;
use crate::Error;

pub(crate) const ENTRY_COLUMNS: &str = "hash, method, original_path, processed_path, timestamp, size, access_count";

/// A cached processed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub method: Method,
    /// Where the input lived when the entry was created. Informational only.
    pub original_path: PathBuf,
    /// The artifact itself. The entry is only valid while this file exists.
    pub processed_path: PathBuf,
    /// Insert time, refreshed on every hit. Drives TTL and eviction order.
    pub touched_at: DateTime<Utc>,
    /// Artifact size recorded at insert; never revalidated.
    pub size_bytes: u64,
    /// Number of hits. Statistics only.
    pub access_count: u64,
}

/// Result of registering an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    Inserted,
    /// An entry for this (fingerprint, method) already exists; it was kept.
    AlreadyExists,
    /// The processed file does not exist, so nothing was cached.
    MissingArtifact,
}

/// Aggregate numbers over the whole index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    pub entry_count: u64,
    pub total_size_bytes: u64,
    pub total_access_count: u64,
    pub counts_by_method: BTreeMap<String, u64>,
}

pub(crate) fn to_epoch(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn from_epoch(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64).unwrap_or_default()
}

pub(crate) fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str()
        .ok_or_else(|| Error::InvalidInput(format!("path is not valid UTF-8: {}", path.display())))
}

fn to_sql_size(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub(crate) fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        fingerprint: Fingerprint::from_stored(row.get(0)?),
        method: row.get(1)?,
        original_path: PathBuf::from(row.get::<_, String>(2)?),
        processed_path: PathBuf::from(row.get::<_, String>(3)?),
        touched_at: from_epoch(row.get(4)?),
        size_bytes: row.get::<_, i64>(5)?.max(0) as u64,
        access_count: row.get::<_, i64>(6)?.max(0) as u64,
    })
}

impl CacheIndex {
    /// Look up the artifact for `(fingerprint, method)`.
    ///
    /// A hit requires both the row and the processed file. On a hit the
    /// entry's access count is incremented and its timestamp refreshed; the
    /// returned entry reflects the update. A row whose file has disappeared
    /// is deleted and reported as absent.
    pub async fn lookup(&self, fingerprint: &Fingerprint, method: Method) -> Result<Option<CacheEntry>, Error> {
        let hash = fingerprint.as_str().to_string();
        let entry = self
            .conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let tx = conn.transaction()?;
                let row = tx.query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM cache WHERE hash = ?1 AND method = ?2"),
                    params![hash, method],
                    entry_from_row,
                );
                let mut entry = match row {
                    Ok(entry) => entry,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                if !entry.processed_path.is_file() {
                    tx.execute("DELETE FROM cache WHERE hash = ?1 AND method = ?2", params![hash, method])?;
                    tx.commit()?;
                    tracing::info!(
                        hash = %hash,
                        method = %method,
                        path = %entry.processed_path.display(),
                        "purged cache entry whose artifact is missing"
                    );
                    return Ok(None);
                }

                let now = Utc::now();
                tx.execute(
                    "UPDATE cache SET access_count = access_count + 1, timestamp = ?3
                     WHERE hash = ?1 AND method = ?2",
                    params![hash, method, to_epoch(now)],
                )?;
                tx.commit()?;

                entry.access_count += 1;
                entry.touched_at = from_epoch(to_epoch(now));
                Ok(Some(entry))
            })
            .await
            .map_err(Error::from)?;

        match &entry {
            Some(e) => tracing::debug!(hash = %fingerprint, method = %method, hits = e.access_count, "cache hit"),
            None => tracing::debug!(hash = %fingerprint, method = %method, "cache miss"),
        }
        Ok(entry)
    }

    /// Register a processed artifact.
    ///
    /// The artifact must already exist; its current size is recorded. A
    /// duplicate key is rejected rather than overwritten. A successful insert
    /// runs a retention sweep before returning; sweep failures are logged and
    /// do not affect the outcome.
    pub async fn insert(
        &self, fingerprint: &Fingerprint, method: Method, original_path: impl AsRef<Path>,
        processed_path: impl AsRef<Path>,
    ) -> Result<InsertOutcome, Error> {
        let hash = fingerprint.as_str().to_string();
        let original = path_str(original_path.as_ref())?.to_string();
        let processed = path_str(processed_path.as_ref())?.to_string();

        let outcome = self
            .conn
            .call(move |conn| -> Result<InsertOutcome, Error> {
                let size = match std::fs::metadata(&processed) {
                    Ok(meta) if meta.is_file() => meta.len(),
                    Ok(_) => return Ok(InsertOutcome::MissingArtifact),
                    Err(e) => {
                        if e.kind() != ErrorKind::NotFound {
                            tracing::warn!(path = %processed, error = %e, "cannot stat artifact, skipping cache insert");
                        }
                        return Ok(InsertOutcome::MissingArtifact);
                    }
                };

                let inserted = conn.execute(
                    "INSERT INTO cache (hash, method, original_path, processed_path, timestamp, size)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(hash, method) DO NOTHING",
                    params![hash, method, original, processed, to_epoch(Utc::now()), to_sql_size(size)],
                )?;

                Ok(if inserted == 1 { InsertOutcome::Inserted } else { InsertOutcome::AlreadyExists })
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(hash = %fingerprint, method = %method, outcome = ?outcome, "cache insert");

        if outcome == InsertOutcome::Inserted {
            if let Err(e) = self.sweep().await {
                tracing::warn!(error = %e, "retention sweep after insert failed");
            }
        }
        Ok(outcome)
    }

    /// Remove the index row for `(fingerprint, method)`.
    ///
    /// The artifact file is left alone. Returns whether a row was removed.
    pub async fn delete(&self, fingerprint: &Fingerprint, method: Method) -> Result<bool, Error> {
        let hash = fingerprint.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache WHERE hash = ?1 AND method = ?2", params![hash, method])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Read an entry without touching it.
    pub async fn peek(&self, fingerprint: &Fingerprint, method: Method) -> Result<Option<CacheEntry>, Error> {
        let hash = fingerprint.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let result = conn.query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM cache WHERE hash = ?1 AND method = ?2"),
                    params![hash, method],
                    entry_from_row,
                );
                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All entries, least recently touched first.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheEntry>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM cache ORDER BY timestamp ASC, rowid ASC"))?;
                let rows = stmt.query_map([], entry_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Aggregate statistics. Read-only.
    pub async fn stats(&self) -> Result<CacheStats, Error> {
        self.conn
            .call(|conn| -> Result<CacheStats, Error> {
                let (entry_count, total_size, total_access): (i64, i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size), 0), COALESCE(SUM(access_count), 0) FROM cache",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

                let mut stmt = conn.prepare("SELECT method, COUNT(*) FROM cache GROUP BY method")?;
                let counts_by_method = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64)))?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;

                Ok(CacheStats {
                    entry_count: entry_count.max(0) as u64,
                    total_size_bytes: total_size.max(0) as u64,
                    total_access_count: total_access.max(0) as u64,
                    counts_by_method,
                })
            })
            .await
            .map_err(Error::from)
    }

    /// Overwrite an entry's timestamp.
    #[cfg(test)]
    pub(crate) async fn set_touched_at(&self, fingerprint: &Fingerprint, method: Method, at: DateTime<Utc>) {
        let hash = fingerprint.as_str().to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE cache SET timestamp = ?3 WHERE hash = ?1 AND method = ?2",
                    params![hash, method, to_epoch(at)],
                )
            })
            .await
            .unwrap();
    }
}
