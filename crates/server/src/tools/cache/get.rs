//! cache_get tool implementation.
//!
//! Reports the metadata of one cached entry.

use metacache_core::{CacheDb, CacheKey, CacheStore, Error, LogicalKey};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Provider id (e.g. "anidb").
    pub provider: String,

    /// Entry category (e.g. "SearchResult").
    pub category: String,

    /// Logical key within the category.
    pub key: String,

    #[serde(default)]
    pub locale: Option<String>,

    /// Treat `key` as free text (trimmed and lower-cased) rather than an identifier.
    #[serde(default)]
    pub is_query: bool,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// Canonical cache key.
    pub key: String,
    pub created_at: String,
    pub updated_at: String,
    /// Size of the stored payload in bytes.
    pub payload_bytes: usize,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheDb, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let logical = if params.is_query { LogicalKey::query(&params.key) } else { LogicalKey::id(params.key.as_str()) };
    let key = CacheKey::new(&params.provider, &params.category, params.locale.as_deref(), logical);

    let entry = cache
        .get(&key)
        .await?
        .filter(|entry| entry.key == key.as_str())
        .ok_or_else(|| Error::CacheMiss(key.to_string()))?;

    let output = CacheGetOutput {
        key: entry.key,
        created_at: entry.created_at.to_rfc3339(),
        updated_at: entry.updated_at.to_rfc3339(),
        payload_bytes: entry.payload.len(),
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize entry: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(key: &str, is_query: bool) -> CacheGetParams {
        CacheGetParams {
            provider: "anidb".to_string(),
            category: "SearchResult".to_string(),
            key: key.to_string(),
            locale: Some("en".to_string()),
            is_query,
        }
    }

    #[tokio::test]
    async fn test_get_impl_missing() {
        let cache = CacheDb::open_in_memory().await.unwrap();

        let result = get_impl(&cache, params("nonexistent", false)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let key = CacheKey::new("anidb", "SearchResult", Some("en"), LogicalKey::query("Cowboy Bebop"));
        cache.put(&key, "[1,2,3]".to_string()).await.unwrap();

        let result = get_impl(&cache, params("  COWBOY bebop ", true)).await.unwrap();
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        let output: CacheGetOutput = serde_json::from_str(text).unwrap();

        assert_eq!(output.key, key.as_str());
        assert_eq!(output.payload_bytes, 7);
    }

    #[tokio::test]
    async fn test_get_impl_id_keys_are_exact() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let key = CacheKey::new("anidb", "SearchResult", Some("en"), LogicalKey::id("Cowboy Bebop"));
        cache.put(&key, "[]".to_string()).await.unwrap();

        assert!(get_impl(&cache, params("cowboy bebop", false)).await.is_err());
        assert!(get_impl(&cache, params("Cowboy Bebop", false)).await.is_ok());
    }
}
