//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::registry::ProviderRegistry;
use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, purge_impl};
use crate::tools::{TitleSearchParams, search_impl};

use metacache_core::CacheDb;
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

/// The main MCP server handler for metacache.
#[derive(Clone)]
pub struct MetacacheServer {
    tool_router: ToolRouter<Self>,
    registry: Arc<ProviderRegistry>,
    cache: CacheDb,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl MetacacheServer {
    /// Create a new server handler.
    pub fn new(registry: Arc<ProviderRegistry>, cache: CacheDb) -> Self {
        Self { tool_router: Self::tool_router(), registry, cache }
    }

    /// Search a provider's offline title catalog.
    #[tool(
        description = "Fuzzy-search a provider's title catalog (e.g. provider=\"anidb\"). Returns ranked titles with ids, aliases and similarity scores."
    )]
    async fn title_search(&self, params: Parameters<TitleSearchParams>) -> Result<CallToolResult, McpError> {
        search_impl(&self.registry, params.0).await
    }

    /// Inspect one cache entry.
    #[tool(
        description = "Look up a cache entry by provider, category, key and locale. Returns its canonical key, timestamps and payload size."
    )]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0).await
    }

    /// Trim the cache.
    #[tool(description = "Purge cache entries by age in days, by provider category, or down to a maximum entry count.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.cache, params.0).await
    }
}

impl ServerHandler for MetacacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "metacache".into(),
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
