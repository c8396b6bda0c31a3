//! metacache server entry point.
//!
//! Boots the MCP server on stdio transport. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use metacache_client::{FetchConfig, HttpFetcher};
use metacache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod registry;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    tracing::info!(db = %config.db_path.display(), "Starting metacache server on stdio transport");

    let cache = CacheDb::open(&config.db_path).await?;
    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::from_app_config(&config))?);
    let registry = registry::ProviderRegistry::from_app_config(&config, Arc::new(cache.clone()), fetcher);

    let handler = handler::MetacacheServer::new(Arc::new(registry), cache);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
