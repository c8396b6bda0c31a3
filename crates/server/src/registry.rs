//! Provider registry.
//!
//! Maps provider ids to their catalogs and result caches. Built once in
//! `main` and handed to the server handler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metacache_client::{RevalidatingFetcher, TitleCatalog, titles};
use metacache_core::{AppConfig, CacheStore, Error, ResultCache};

pub struct ProviderRegistry {
    store: Arc<dyn CacheStore>,
    result_ttl: Duration,
    catalogs: BTreeMap<String, Arc<TitleCatalog>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.catalogs.keys().collect::<Vec<_>>())
            .field("result_ttl", &self.result_ttl)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn CacheStore>, result_ttl: Duration) -> Self {
        Self { store, result_ttl, catalogs: BTreeMap::new() }
    }

    /// Registry with every built-in provider.
    pub fn from_app_config(
        config: &AppConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn RevalidatingFetcher>,
    ) -> Self {
        let anidb = TitleCatalog::from_app_config(config, Arc::clone(&store), fetcher);
        let mut registry = Self::new(store, config.result_ttl());
        registry.register(titles::PROVIDER, anidb);
        registry
    }

    pub fn register(&mut self, provider: impl Into<String>, catalog: TitleCatalog) {
        let provider = provider.into();
        tracing::debug!(provider = %provider, "registered catalog");
        self.catalogs.insert(provider, Arc::new(catalog));
    }

    pub fn catalog(&self, provider: &str) -> Result<Arc<TitleCatalog>, Error> {
        self.catalogs.get(provider).cloned().ok_or_else(|| {
            Error::InvalidInput(format!("unknown provider '{provider}', expected one of: {}", self.providers().join(", ")))
        })
    }

    /// Result cache scoped to one provider.
    pub fn results(&self, provider: &str) -> ResultCache {
        ResultCache::new(provider, Arc::clone(&self.store), self.result_ttl)
    }

    pub fn providers(&self) -> Vec<&str> {
        self.catalogs.keys().map(String::as_str).collect()
    }
}
