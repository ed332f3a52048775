//! cache_stats tool implementation.

use reelcache_core::CacheIndex;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;

/// Implementation of the cache_stats tool.
pub async fn stats_impl(index: &CacheIndex) -> Result<CallToolResult, McpError> {
    let stats = index.stats().await?;
    json_result(&stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_result;
    use reelcache_core::cache::{CacheStats, RetentionPolicy, fingerprint_file};
    use reelcache_core::{BlockingPool, Method};

    #[tokio::test]
    async fn test_stats_counts_by_method() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"raw").unwrap();
        let index = CacheIndex::open_in_memory(RetentionPolicy::default(), BlockingPool::default()).await.unwrap();
        let fingerprint = fingerprint_file(&input).unwrap();
        for (method, size) in [(Method::Crocodile, 100), (Method::Dolphin, 50)] {
            let artifact = dir.path().join(format!("clip_{method}.mp4"));
            std::fs::write(&artifact, vec![0u8; size]).unwrap();
            index.insert(&fingerprint, method, &input, &artifact).await.unwrap();
        }

        let result = stats_impl(&index).await.unwrap();
        let stats: CacheStats = parse_result(&result);

        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size_bytes, 150);
        assert_eq!(stats.counts_by_method.get("crocodile"), Some(&1));
        assert_eq!(stats.counts_by_method.get("dolphin"), Some(&1));
    }
}
