//! Background cleanup cycle.
//!
//! One cycle deletes stale scratch files, sweeps the cache index, then prunes
//! the empty scratch directories. A failing step is logged and the cycle moves
//! on; nothing here ever stops the host process.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::{CacheIndex, SweepReport};
use crate::janitor::Janitor;

/// What a single cleanup cycle did.
///
/// A `None` field means that step failed and was logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CleanupReport {
    pub temp_files_deleted: Option<u64>,
    pub sweep: Option<SweepReport>,
    pub dirs_removed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct Maintenance {
    index: CacheIndex,
    janitor: Janitor,
    temp_max_age: Duration,
}

impl Maintenance {
    pub fn new(index: CacheIndex, janitor: Janitor, temp_max_age: Duration) -> Self {
        Self { index, janitor, temp_max_age }
    }

    /// Run one cycle: temp files, retention sweep, empty directories.
    pub async fn run_once(&self) -> CleanupReport {
        let temp_files_deleted = match self.janitor.clean_temp_files(self.temp_max_age).await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::error!(error = %e, "temp file cleanup failed");
                None
            }
        };

        let sweep = match self.index.sweep().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "cache sweep failed");
                None
            }
        };

        let dirs_removed = match self.janitor.clean_empty_dirs().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::error!(error = %e, "empty directory cleanup failed");
                None
            }
        };

        let report = CleanupReport { temp_files_deleted, sweep, dirs_removed };
        tracing::info!(
            temp_files_deleted = ?report.temp_files_deleted,
            cache_entries_removed = ?report.sweep.map(|s| s.expired + s.evicted),
            dirs_removed = ?report.dirs_removed,
            "cleanup cycle finished"
        );
        report
    }

    /// Run [`Self::run_once`] every `interval`, starting immediately.
    ///
    /// Ticks missed while a slow cycle runs are delayed rather than bunched up.
    pub fn spawn_periodic(self, interval: Duration) -> JoinHandle<()> {
        tracing::info!(interval_secs = interval.as_secs(), "starting periodic cleanup");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
