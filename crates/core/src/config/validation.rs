//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::janitor::roots_overlap;
use thiserror::Error;

/// Upper bound on `worker_threads`.
const MAX_WORKERS: usize = 64;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid { field: field.into(), reason: "must be greater than 0".into() });
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - any duration or the size budget is 0
    /// - `worker_threads` is 0 or exceeds 64
    /// - `temp_dir` or `processed_dir` is empty
    /// - `temp_dir` and `processed_dir` overlap
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("cache_ttl_secs", self.cache_ttl_secs)?;
        positive("cache_max_size_bytes", self.cache_max_size_bytes)?;
        positive("temp_max_age_secs", self.temp_max_age_secs)?;
        positive("cleanup_interval_secs", self.cleanup_interval_secs)?;

        if self.worker_threads == 0 || self.worker_threads > MAX_WORKERS {
            return Err(ConfigError::Invalid {
                field: "worker_threads".into(),
                reason: format!("must be between 1 and {MAX_WORKERS}"),
            });
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set REELCACHE_DB_PATH environment variable".into(),
            });
        }

        for (field, dir) in [("temp_dir", &self.temp_dir), ("processed_dir", &self.processed_dir)] {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        if roots_overlap(&self.temp_dir, &self.processed_dir) {
            return Err(ConfigError::Invalid {
                field: "temp_dir".into(),
                reason: format!(
                    "must not overlap processed_dir ({} vs {})",
                    self.temp_dir.display(),
                    self.processed_dir.display()
                ),
            });
        }

        if self.temp_max_age_secs < self.cleanup_interval_secs {
            tracing::warn!(
                temp_max_age_secs = self.temp_max_age_secs,
                cleanup_interval_secs = self.cleanup_interval_secs,
                "temp files may outlive temp_max_age_secs by up to one cleanup interval"
            );
        }

        Ok(())
    }
}
