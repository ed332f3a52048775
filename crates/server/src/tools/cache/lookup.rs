//! cache_lookup tool implementation.
//!
//! Reads one cache entry by fingerprint and method without touching it, so
//! inspecting the cache never extends an entry's lifetime.

use reelcache_core::{CacheEntry, CacheIndex, Error, Fingerprint, Method};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheLookupParams {
    /// SHA-256 fingerprint of the original video (64 hex characters).
    pub hash: String,

    /// Transform method: crocodile, dolphin or grizzly.
    pub method: String,
}

/// Output from the cache_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheLookupOutput {
    /// The cached entry.
    pub entry: CacheEntry,
}

/// Implementation of the cache_lookup tool.
pub async fn lookup_impl(index: &CacheIndex, params: CacheLookupParams) -> Result<CallToolResult, McpError> {
    let fingerprint = Fingerprint::parse(&params.hash)?;
    let method: Method = params.method.parse()?;

    let entry = index
        .peek(&fingerprint, method)
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{fingerprint} ({method})")))?;

    json_result(&CacheLookupOutput { entry })
}
