//! cache_sweep tool implementation.
//!
//! Runs a retention sweep now instead of waiting for the next cleanup cycle.

use reelcache_core::CacheIndex;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;

/// Implementation of the cache_sweep tool.
pub async fn sweep_impl(index: &CacheIndex) -> Result<CallToolResult, McpError> {
    let report = index.sweep().await?;
    json_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_result;
    use reelcache_core::cache::{RetentionPolicy, SweepReport, fingerprint_file};
    use reelcache_core::{BlockingPool, Method};
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweep_empty_index() {
        let index = CacheIndex::open_in_memory(RetentionPolicy::default(), BlockingPool::default()).await.unwrap();
        let result = sweep_impl(&index).await.unwrap();
        let report: SweepReport = parse_result(&result);
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        let artifact = dir.path().join("clip.out.mp4");
        std::fs::write(&input, b"raw").unwrap();
        std::fs::write(&artifact, b"processed").unwrap();

        let policy = RetentionPolicy { ttl: Duration::from_millis(50), max_size_bytes: u64::MAX };
        let index = CacheIndex::open_in_memory(policy, BlockingPool::default()).await.unwrap();
        let fingerprint = fingerprint_file(&input).unwrap();
        index.insert(&fingerprint, Method::Dolphin, &input, &artifact).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let result = sweep_impl(&index).await.unwrap();
        let report: SweepReport = parse_result(&result);

        assert_eq!(report.expired, 1);
        assert_eq!(report.files_deleted, 1);
        assert!(!artifact.exists());
    }
}
