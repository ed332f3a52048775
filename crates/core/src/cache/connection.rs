//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite index, applying required pragmas
//! for performance and concurrency (WAL mode), and running migrations.

use super::migrations;
use super::retention::RetentionPolicy;
use crate::Error;
use crate::pool::BlockingPool;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA busy_timeout=5000;";

/// Handle to the persisted cache index.
///
/// Wraps a tokio-rusqlite Connection that runs every statement on one
/// background thread, which is what serializes conflicting writes. Clones
/// share the same connection, pool and retention policy.
#[derive(Clone, Debug)]
pub struct CacheIndex {
    pub(crate) conn: Connection,
    pub(crate) pool: BlockingPool,
    pub(crate) policy: RetentionPolicy,
}

impl CacheIndex {
    /// Open an index at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>, policy: RetentionPolicy, pool: BlockingPool) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, policy, pool).await
    }

    /// Open an in-memory index for testing.
    pub async fn open_in_memory(policy: RetentionPolicy, pool: BlockingPool) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, policy, pool).await
    }

    async fn init(conn: Connection, policy: RetentionPolicy, pool: BlockingPool) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, pool, policy })
    }

    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }
}
