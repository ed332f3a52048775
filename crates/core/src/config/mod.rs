//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (REELCACHE_*)
//! 2. TOML config file (if REELCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::RetentionPolicy;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (REELCACHE_*)
/// 2. TOML config file (if REELCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache index.
    ///
    /// Set via REELCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Scratch directory for downloads and in-progress transforms.
    ///
    /// Set via REELCACHE_TEMP_DIR environment variable.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory holding cached processed artifacts.
    ///
    /// Set via REELCACHE_PROCESSED_DIR environment variable.
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,

    /// Seconds an entry survives without being hit.
    ///
    /// Set via REELCACHE_CACHE_TTL_SECS environment variable.
    #[serde(default = "default_day_secs")]
    pub cache_ttl_secs: u64,

    /// Total artifact bytes the cache may hold.
    ///
    /// Set via REELCACHE_CACHE_MAX_SIZE_BYTES environment variable.
    #[serde(default = "default_cache_max_size_bytes")]
    pub cache_max_size_bytes: u64,

    /// Age in seconds after which scratch files are deleted.
    ///
    /// Set via REELCACHE_TEMP_MAX_AGE_SECS environment variable.
    #[serde(default = "default_day_secs")]
    pub temp_max_age_secs: u64,

    /// Seconds between background cleanup cycles.
    ///
    /// Set via REELCACHE_CLEANUP_INTERVAL_SECS environment variable.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Concurrent blocking jobs (hashing, deletes, directory walks).
    ///
    /// Set via REELCACHE_WORKER_THREADS environment variable.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./reelcache.sqlite")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp_files")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("processed_videos")
}

fn default_day_secs() -> u64 {
    24 * 3600
}

fn default_cache_max_size_bytes() -> u64 {
    10 * 1024 * 1024 * 1024 // 10GB
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_worker_threads() -> usize {
    crate::pool::DEFAULT_WORKERS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            temp_dir: default_temp_dir(),
            processed_dir: default_processed_dir(),
            cache_ttl_secs: default_day_secs(),
            cache_max_size_bytes: default_cache_max_size_bytes(),
            temp_max_age_secs: default_day_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl AppConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy { ttl: Duration::from_secs(self.cache_ttl_secs), max_size_bytes: self.cache_max_size_bytes }
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `REELCACHE_`
    /// 2. TOML file from `REELCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("REELCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(
            Env::prefixed("REELCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        ))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Create the temp, processed and index parent directories if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the directory that could not be created.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let index_dir = self.db_path.parent().filter(|p| !p.as_os_str().is_empty());
        let dirs = [
            ("temp_dir", Some(self.temp_dir.as_path())),
            ("processed_dir", Some(self.processed_dir.as_path())),
            ("db_path", index_dir),
        ];
        for (field, dir) in dirs {
            let Some(dir) = dir else { continue };
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Invalid {
                field: field.into(),
                reason: format!("cannot create {}: {e}", dir.display()),
            })?;
        }
        Ok(())
    }
}
