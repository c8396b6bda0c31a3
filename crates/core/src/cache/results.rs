//! Provider-scoped cache for small structured values.
//!
//! Search result lists and per-locale series payloads are not conditionally
//! revalidated; they simply expire after a TTL. Every storage failure here
//! degrades to a miss (on read) or a no-op (on write) and is logged.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::key::{CacheKey, LogicalKey};
use super::store::{CacheLookup, CacheStore, lookup};

/// Category under which search results are stored.
pub const SEARCH_RESULT: &str = "SearchResult";

/// Category prefix for series payloads; the sort order is appended.
pub const SERIES_DATA: &str = "SeriesData";

#[derive(Clone)]
pub struct ResultCache {
    provider: String,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("provider", &self.provider)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    pub fn new(provider: impl Into<String>, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { provider: provider.into(), store, ttl }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn key(&self, category: &str, key: LogicalKey, locale: Option<&str>) -> CacheKey {
        CacheKey::new(&self.provider, category, locale, key)
    }

    /// Cache the results of a free-text search. Returns `value` unchanged.
    pub async fn put_search_result<T: Serialize>(&self, query: &str, locale: Option<&str>, value: Vec<T>) -> Vec<T> {
        self.put_data(SEARCH_RESULT, LogicalKey::query(query), locale, value)
            .await
    }

    pub async fn get_search_result<T: DeserializeOwned>(&self, query: &str, locale: Option<&str>) -> Option<Vec<T>> {
        self.get_data(SEARCH_RESULT, LogicalKey::query(query), locale)
            .await
    }

    /// Cache a series payload under its identifier and sort order.
    pub async fn put_series_data<T: Serialize>(
        &self, series_id: &str, sort_order: &str, locale: Option<&str>, value: T,
    ) -> T {
        let category = format!("{SERIES_DATA}.{sort_order}");
        self.put_data(&category, LogicalKey::id(series_id), locale, value)
            .await
    }

    pub async fn get_series_data<T: DeserializeOwned>(
        &self, series_id: &str, sort_order: &str, locale: Option<&str>,
    ) -> Option<T> {
        let category = format!("{SERIES_DATA}.{sort_order}");
        self.get_data(&category, LogicalKey::id(series_id), locale).await
    }

    /// Store any serializable value. Never fails; returns `value` for chaining.
    pub async fn put_data<T: Serialize>(&self, category: &str, key: LogicalKey, locale: Option<&str>, value: T) -> T {
        let key = self.key(category, key, locale);
        match serde_json::to_string(&value) {
            Ok(payload) => {
                if let Err(e) = self.store.put(&key, payload).await {
                    tracing::warn!(key = %key, "failed to cache result: {}", e);
                }
            }
            Err(e) => tracing::warn!(key = %key, "failed to encode result: {}", e),
        }
        value
    }

    /// Read a value if present and younger than the TTL.
    pub async fn get_data<T: DeserializeOwned>(
        &self, category: &str, key: LogicalKey, locale: Option<&str>,
    ) -> Option<T> {
        let key = self.key(category, key, locale);
        match lookup::<T>(self.store.as_ref(), &key).await {
            CacheLookup::Hit(entry) if !entry.is_stale(self.ttl) => {
                tracing::debug!(key = %key, "result cache hit");
                Some(entry.value)
            }
            CacheLookup::Hit(_) => {
                tracing::debug!(key = %key, "result cache entry expired");
                None
            }
            CacheLookup::Miss | CacheLookup::Corrupt(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::cache::memory::MemoryStore;
    use crate::cache::store::StoredEntry;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<StoredEntry>, Error> {
            Err(Error::Serialization("disk on fire".into()))
        }

        async fn put(&self, _key: &CacheKey, _payload: String) -> Result<(), Error> {
            Err(Error::Serialization("disk on fire".into()))
        }

        async fn revalidation_token(&self, _locator: &str) -> Result<Option<String>, Error> {
            Err(Error::Serialization("disk on fire".into()))
        }

        async fn put_revalidation_token(&self, _locator: &str, _token: &str) -> Result<(), Error> {
            Err(Error::Serialization("disk on fire".into()))
        }
    }

    fn cache(ttl: Duration) -> ResultCache {
        ResultCache::new("anidb", Arc::new(MemoryStore::new()), ttl)
    }

    #[tokio::test]
    async fn test_search_result_roundtrip_normalizes_query() {
        let cache = cache(Duration::from_secs(60));
        let stored = cache
            .put_search_result("  Cowboy Bebop ", Some("en"), vec!["Cowboy Bebop".to_string()])
            .await;
        assert_eq!(stored.len(), 1);

        let hit: Option<Vec<String>> = cache.get_search_result("cowboy bebop", Some("en")).await;
        assert_eq!(hit, Some(vec!["Cowboy Bebop".to_string()]));

        let other_locale: Option<Vec<String>> = cache.get_search_result("cowboy bebop", Some("ja")).await;
        assert!(other_locale.is_none());
    }

    #[tokio::test]
    async fn test_series_data_is_scoped_by_sort_order() {
        let cache = cache(Duration::from_secs(60));
        cache.put_series_data("23", "Airdate", None, 1u32).await;

        assert_eq!(cache.get_series_data::<u32>("23", "Airdate", None).await, Some(1));
        assert_eq!(cache.get_series_data::<u32>("23", "Absolute", None).await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = cache(Duration::ZERO);
        cache.put_data("Episode", LogicalKey::id("1"), None, 42u32).await;
        assert_eq!(cache.get_data::<u32>("Episode", LogicalKey::id("1"), None).await, None);
    }

    #[tokio::test]
    async fn test_storage_failures_degrade_to_miss() {
        let cache = ResultCache::new("anidb", Arc::new(BrokenStore), Duration::from_secs(60));
        let value = cache.put_data("Episode", LogicalKey::id("1"), None, 7u32).await;
        assert_eq!(value, 7);
        assert_eq!(cache.get_data::<u32>("Episode", LogicalKey::id("1"), None).await, None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = cache(Duration::from_secs(60));
        cache.put_data("Episode", LogicalKey::id("1"), None, "text").await;
        assert_eq!(cache.get_data::<u32>("Episode", LogicalKey::id("1"), None).await, None);
    }
}
