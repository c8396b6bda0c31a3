//! cache_purge tool implementation.
//!
//! Purges cache entries by age, category, or count.

use std::time::Duration;

use metacache_core::{CacheDb, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Purge entries not updated for this many days.
    pub older_than_days: Option<u32>,

    /// Keep only the newest N entries (LRU purge).
    pub max_entries: Option<usize>,

    /// Purge one provider category; requires `category`.
    pub provider: Option<String>,

    /// Category to purge (e.g. "SearchResult"); requires `provider`.
    pub category: Option<String>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheDb, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let category = match (params.provider, params.category) {
        (Some(provider), Some(category)) => Some((provider, category)),
        (None, None) => None,
        _ => return Err(Error::InvalidInput("provider and category must be given together".to_string()).into()),
    };

    if params.older_than_days.is_none() && params.max_entries.is_none() && category.is_none() {
        return Err(Error::InvalidInput(
            "At least one of older_than_days, max_entries, or provider/category must be specified".to_string(),
        )
        .into());
    }

    let mut deleted_total = 0u64;

    if let Some(days) = params.older_than_days {
        let age = Duration::from_secs(u64::from(days) * 86_400);
        deleted_total += cache.purge_entries_older_than(age).await?;
    }

    if let Some((provider, category)) = category {
        deleted_total += cache.purge_category(&provider, &category).await?;
    }

    if let Some(max_entries) = params.max_entries {
        deleted_total += cache.purge_lru_entries(max_entries).await?;
    }

    tracing::info!("purged {} cache entries", deleted_total);

    let output = CachePurgeOutput { deleted: deleted_total };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
