//! Bounded pool for blocking filesystem work.
//!
//! Hashing large uploads, unlinking evicted artifacts and walking the scratch
//! tree all block. They run on tokio's blocking threads, gated by a semaphore
//! so at most `workers` of them are in flight at once.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::Error;

/// Default number of concurrent blocking jobs.
pub const DEFAULT_WORKERS: usize = 2;

/// Handle to a bounded set of blocking workers. Cheap to clone.
#[derive(Clone, Debug)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl BlockingPool {
    /// Create a pool that runs at most `workers` jobs at once (minimum 1).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self { permits: Arc::new(Semaphore::new(workers)), workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a blocking thread and wait for its result.
    ///
    /// The caller's task is suspended while queued or running; other tasks on
    /// the runtime keep being served.
    pub async fn run<F, T>(&self, job: F) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Worker(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| Error::Worker(e.to_string()))?
    }
}
