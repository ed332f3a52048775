//! temp_cleanup tool implementation.
//!
//! Cleans the scratch directory on demand: either every stale file plus the
//! empty directories left behind, or only the uploads of one user.

use std::time::Duration;

use reelcache_core::Janitor;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the temp_cleanup tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TempCleanupParams {
    /// Delete files older than this many seconds (defaults to the configured age).
    pub older_than_secs: Option<u64>,

    /// Delete only this user's uploads, regardless of age.
    pub user_id: Option<i64>,
}

/// Output from the temp_cleanup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TempCleanupOutput {
    /// Number of files deleted.
    pub files_deleted: u64,

    /// Number of empty directories removed.
    pub dirs_removed: u64,
}

/// Implementation of the temp_cleanup tool.
pub async fn temp_cleanup_impl(
    janitor: &Janitor, default_max_age: Duration, params: TempCleanupParams,
) -> Result<CallToolResult, McpError> {
    let output = match params.user_id {
        Some(user_id) => TempCleanupOutput { files_deleted: janitor.clean_user_files(user_id).await?, dirs_removed: 0 },
        None => {
            let max_age = params.older_than_secs.map_or(default_max_age, Duration::from_secs);
            let files_deleted = janitor.clean_temp_files(max_age).await?;
            let dirs_removed = janitor.clean_empty_dirs().await?;
            TempCleanupOutput { files_deleted, dirs_removed }
        }
    };

    json_result(&output)
}
