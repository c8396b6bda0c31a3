//! title_search tool implementation.
//!
//! Ranks a provider's offline catalog against a free-text query. Results are
//! kept in the provider's result cache, so repeated queries skip the index.

use metacache_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::ProviderRegistry;

/// Parameters for the title_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TitleSearchParams {
    /// Provider whose catalog to search (e.g. "anidb").
    pub provider: String,

    /// Free-text query.
    pub query: String,

    /// Locale the results are cached under.
    #[serde(default)]
    pub locale: Option<String>,
}

/// One ranked title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TitleHit {
    pub id: u32,
    pub name: String,
    pub aliases: Vec<String>,
    /// Best name similarity in [0, 1].
    pub score: f32,
}

/// Output from the title_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TitleSearchOutput {
    pub provider: String,
    pub query: String,
    pub results: Vec<TitleHit>,
    /// Whether the results came from the result cache.
    pub cached: bool,
}

/// Implementation of the title_search tool.
pub async fn search_impl(registry: &ProviderRegistry, params: TitleSearchParams) -> Result<CallToolResult, McpError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(Error::InvalidInput("query must not be empty".to_string()).into());
    }

    let catalog = registry.catalog(&params.provider)?;
    let results = registry.results(&params.provider);
    let locale = params.locale.as_deref();

    let (hits, cached) = match results.get_search_result::<TitleHit>(query, locale).await {
        Some(hits) => {
            tracing::debug!("search result cache hit for {}", query);
            (hits, true)
        }
        None => {
            let hits: Vec<TitleHit> = catalog
                .search(query)
                .await?
                .into_iter()
                .map(|hit| TitleHit {
                    id: hit.record.id,
                    name: hit.record.name,
                    aliases: hit.record.aliases,
                    score: hit.score,
                })
                .collect();
            (results.put_search_result(query, locale, hits).await, false)
        }
    };

    let output = TitleSearchOutput { provider: params.provider, query: query.to_string(), results: hits, cached };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
