//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::time::Duration;

use crate::tools::cache::{CacheLookupParams, lookup_impl, stats_impl, sweep_impl};
use crate::tools::{TempCleanupParams, temp_cleanup_impl};

use reelcache_core::{CacheIndex, Janitor};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for reelcache.
#[derive(Clone)]
pub struct ReelcacheServer {
    tool_router: ToolRouter<Self>,
    index: CacheIndex,
    janitor: Janitor,
    temp_max_age: Duration,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ReelcacheServer {
    /// Create a new server handler over an opened index and janitor.
    pub fn new(index: CacheIndex, janitor: Janitor, temp_max_age: Duration) -> Self {
        Self { tool_router: Self::tool_router(), index, janitor, temp_max_age }
    }

    #[tool(description = "Summarize the cache: entry count, total artifact bytes, hits, and entries per method.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.index).await
    }

    /// Inspect one entry without refreshing its timestamp.
    #[tool(description = "Look up a cached artifact by original-video SHA-256 and method. Does not count as a hit.")]
    async fn cache_lookup(&self, params: Parameters<CacheLookupParams>) -> Result<CallToolResult, McpError> {
        lookup_impl(&self.index, params.0).await
    }

    #[tool(description = "Run a retention sweep now: drop expired entries, then evict the oldest until under budget.")]
    async fn cache_sweep(&self) -> Result<CallToolResult, McpError> {
        sweep_impl(&self.index).await
    }

    #[tool(description = "Delete stale scratch files and empty directories, or only one user's uploads.")]
    async fn temp_cleanup(&self, params: Parameters<TempCleanupParams>) -> Result<CallToolResult, McpError> {
        temp_cleanup_impl(&self.janitor, self.temp_max_age, params.0).await
    }
}

impl ServerHandler for ReelcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "reelcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
