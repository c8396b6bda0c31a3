//! Cached, revalidating, retrying resource retrieval.
//!
//! [`CachedResource::get`] turns an unreliable remote fetch into a durable
//! value:
//!
//! 1. A fresh cached value is returned without touching the network.
//! 2. Otherwise the locator is fetched under the rate limiter and retry
//!    policy, sending validators when a previous value exists.
//! 3. A fresh body is parsed and stored; `304 Not Modified` keeps the
//!    previous value and restarts its TTL.
//! 4. When the fetch or parse fails, a previous value is served instead.
//!    Only when nothing was cached does the caller see the error.
//!
//! Concurrent `get` calls for one key share a single in-flight refresh.
//! Different keys never wait on each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use metacache_core::{CacheEntry, CacheKey, CacheStore, cache::lookup};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::fetch::{FetchError, FetchOutcome, RevalidatingFetcher, Validators, canonicalize};
use crate::limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Errors surfaced by [`CachedResource::get`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// The resource does not exist, or its key resolves to no usable locator.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Retries exhausted (or deadline hit) with nothing cached.
    #[error("resource unavailable: {0}")]
    Unavailable(String),

    #[error("malformed payload: {0}")]
    Parse(String),
}

impl From<FetchError> for ResourceError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { .. } => ResourceError::NotFound(err.to_string()),
            other => ResourceError::Unavailable(other.to_string()),
        }
    }
}

impl From<ResourceError> for metacache_core::Error {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NotFound(msg) => metacache_core::Error::NotFound(msg),
            ResourceError::Unavailable(msg) => metacache_core::Error::Unavailable(msg),
            ResourceError::Parse(msg) => metacache_core::Error::ParseError(msg),
        }
    }
}

/// What a resource is and how to get it: the pluggable half of [`CachedResource`].
pub trait ResourceDescriptor: Send + Sync + 'static {
    type Key: Clone + Send + Sync + 'static;
    type Value: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Where the value lives in the cache store.
    fn cache_key(&self, key: &Self::Key) -> CacheKey;

    /// Network address for a key.
    fn locator(&self, key: &Self::Key) -> Result<String, ResourceError>;

    fn parse(&self, bytes: Bytes) -> Result<Self::Value, ResourceError>;
}

/// Tuning knobs for a [`CachedResource`].
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    /// Age after which a cached value is revalidated.
    pub ttl: Duration,
    pub retry: RetryPolicy,
    /// Bound on the whole fetch and retry loop.
    pub deadline: Duration,
    pub limiter: Option<RateLimiter>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(86_400), retry: RetryPolicy::default(), deadline: Duration::from_secs(60), limiter: None }
    }
}

impl ResourceOptions {
    pub fn from_app_config(config: &metacache_core::AppConfig, ttl: Duration) -> Self {
        Self {
            ttl,
            retry: RetryPolicy::from_app_config(config),
            deadline: config.deadline(),
            limiter: Some(RateLimiter::from_app_config(config)),
        }
    }
}

type Flight<V> = BoxFuture<'static, Result<V, ResourceError>>;

struct Inner<D: ResourceDescriptor> {
    descriptor: D,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn RevalidatingFetcher>,
    options: ResourceOptions,
    next_flight: AtomicU64,
    inflight: Mutex<HashMap<String, (u64, WeakShared<Flight<D::Value>>)>>,
}

/// A remote resource backed by a [`CacheStore`].
pub struct CachedResource<D: ResourceDescriptor> {
    inner: Arc<Inner<D>>,
}

impl<D: ResourceDescriptor> Clone for CachedResource<D> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D: ResourceDescriptor> std::fmt::Debug for CachedResource<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResource")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl<D: ResourceDescriptor> CachedResource<D> {
    pub fn new(
        descriptor: D, store: Arc<dyn CacheStore>, fetcher: Arc<dyn RevalidatingFetcher>, options: ResourceOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor,
                store,
                fetcher,
                options,
                next_flight: AtomicU64::new(0),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn descriptor(&self) -> &D {
        &self.inner.descriptor
    }

    pub fn ttl(&self) -> Duration {
        self.inner.options.ttl
    }

    /// Current value for `key`, fetching or revalidating as needed.
    pub async fn get(&self, key: D::Key) -> Result<D::Value, ResourceError> {
        let cache_key = self.inner.descriptor.cache_key(&key);

        if let Some(entry) = lookup::<D::Value>(self.inner.store.as_ref(), &cache_key)
            .await
            .into_entry()
            && !entry.is_stale(self.inner.options.ttl)
        {
            tracing::debug!(key = %cache_key, "resource cache hit");
            return Ok(entry.value);
        }

        self.flight(key, cache_key).await
    }

    /// Join the in-flight refresh for this key or start one.
    fn flight(&self, key: D::Key, cache_key: CacheKey) -> Shared<Flight<D::Value>> {
        let slot = cache_key.as_str().to_string();
        let mut inflight = self.inner.inflight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(running) = inflight.get(&slot).and_then(|(_, weak)| weak.upgrade()) {
            tracing::debug!(key = %cache_key, "joining in-flight refresh");
            return running;
        }

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard { inner: Arc::clone(&self.inner), slot: slot.clone(), id };
        let inner = Arc::clone(&self.inner);
        let shared = async move {
            let _guard = guard;
            inner.refresh(key, cache_key).await
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            inflight.insert(slot, (id, weak));
        }
        shared
    }
}

impl<D: ResourceDescriptor> Inner<D> {
    async fn refresh(self: Arc<Self>, key: D::Key, cache_key: CacheKey) -> Result<D::Value, ResourceError> {
        let previous = lookup::<D::Value>(self.store.as_ref(), &cache_key)
            .await
            .into_entry();

        // a flight that just finished may already have refreshed the entry
        if let Some(entry) = &previous
            && !entry.is_stale(self.options.ttl)
        {
            return Ok(entry.value.clone());
        }

        let locator = match self
            .descriptor
            .locator(&key)
            .and_then(|raw| {
                canonicalize(&raw).map_err(|e| ResourceError::NotFound(format!("no locator for {cache_key}: {e}")))
            })
        {
            Ok(locator) => locator,
            Err(e) => return self.fall_back(&cache_key, previous, e),
        };

        let validators = self.validators(&locator, previous.as_ref()).await;

        match self.fetch(&locator, &validators).await {
            FetchOutcome::Fresh(fresh) => match self.parse(fresh.bytes).await {
                Ok(value) => {
                    self.store_value(&cache_key, &value).await;
                    if let Some(etag) = fresh.etag
                        && let Err(e) = self.store.put_revalidation_token(locator.as_str(), &etag).await
                    {
                        tracing::warn!(locator = %locator, "failed to store revalidation token: {}", e);
                    }
                    Ok(value)
                }
                Err(e) => self.fall_back(&cache_key, previous, e),
            },
            FetchOutcome::NotModified => match previous {
                Some(entry) => {
                    tracing::debug!(key = %cache_key, "not modified, extending cached value");
                    self.store_value(&cache_key, &entry.value).await;
                    Ok(entry.value)
                }
                None => Err(ResourceError::Unavailable(format!("{locator} reported not modified but nothing is cached"))),
            },
            FetchOutcome::Failed(e) => self.fall_back(&cache_key, previous, e.into()),
        }
    }

    /// Validators are only meaningful relative to a value we already hold.
    async fn validators(&self, locator: &url::Url, previous: Option<&CacheEntry<D::Value>>) -> Validators {
        let Some(entry) = previous else {
            return Validators::none();
        };

        let token = match self.store.revalidation_token(locator.as_str()).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(locator = %locator, "failed to read revalidation token: {}", e);
                None
            }
        };

        Validators { last_modified: Some(entry.last_modified()), token }
    }

    async fn fetch(&self, locator: &url::Url, validators: &Validators) -> FetchOutcome {
        let fetcher = self.fetcher.as_ref();
        let limiter = self.options.limiter.as_ref();

        let attempts = self.options.retry.run(move || async move {
            if let Some(limiter) = limiter {
                limiter.acquire().await;
            }
            fetcher.fetch(locator, validators).await
        });

        match tokio::time::timeout(self.options.deadline, attempts).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(locator = %locator, "deadline of {}ms exceeded", self.options.deadline.as_millis());
                FetchOutcome::Failed(FetchError::Timeout)
            }
        }
    }

    async fn parse(self: &Arc<Self>, bytes: Bytes) -> Result<D::Value, ResourceError> {
        let inner = Arc::clone(self);
        tokio::task::spawn_blocking(move || inner.descriptor.parse(bytes))
            .await
            .map_err(|e| ResourceError::Parse(format!("parse task failed: {e}")))?
    }

    async fn store_value(&self, cache_key: &CacheKey, value: &D::Value) {
        match serde_json::to_string(value) {
            Ok(payload) => {
                if let Err(e) = self.store.put(cache_key, payload).await {
                    tracing::warn!(key = %cache_key, "failed to store resource: {}", e);
                }
            }
            Err(e) => tracing::warn!(key = %cache_key, "failed to encode resource: {}", e),
        }
    }

    fn fall_back(
        &self, cache_key: &CacheKey, previous: Option<CacheEntry<D::Value>>, err: ResourceError,
    ) -> Result<D::Value, ResourceError> {
        match previous {
            Some(entry) => {
                tracing::warn!(key = %cache_key, "serving stale value: {}", err);
                Ok(entry.value)
            }
            None => Err(err),
        }
    }
}

/// Removes a flight from the in-flight map when it finishes or is abandoned.
struct FlightGuard<D: ResourceDescriptor> {
    inner: Arc<Inner<D>>,
    slot: String,
    id: u64,
}

impl<D: ResourceDescriptor> Drop for FlightGuard<D> {
    fn drop(&mut self) {
        let mut inflight = self.inner.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight.get(&self.slot).is_some_and(|(id, _)| *id == self.id) {
            inflight.remove(&self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Fresh;
    use crate::retry::Backoff;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use metacache_core::{LogicalKey, MemoryStore};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use tokio::time::Instant;

    struct Listing;

    impl ResourceDescriptor for Listing {
        type Key = String;
        type Value = Vec<String>;

        fn cache_key(&self, key: &String) -> CacheKey {
            CacheKey::new("test", "Listing", None, LogicalKey::id(key.as_str()))
        }

        fn locator(&self, key: &String) -> Result<String, ResourceError> {
            match key.strip_prefix("raw:") {
                Some(raw) => Ok(raw.to_string()),
                None => Ok(format!("http://provider.test/{key}")),
            }
        }

        fn parse(&self, bytes: Bytes) -> Result<Vec<String>, ResourceError> {
            let text = std::str::from_utf8(&bytes).map_err(|e| ResourceError::Parse(e.to_string()))?;
            if text.starts_with('!') {
                return Err(ResourceError::Parse("bad listing".into()));
            }
            Ok(text.split(',').map(str::to_string).collect())
        }
    }

    /// Plays back canned outcomes, then fails transiently forever.
    #[derive(Default)]
    struct ScriptedFetcher {
        script: Mutex<VecDeque<FetchOutcome>>,
        seen: Mutex<Vec<Validators>>,
        calls: AtomicU32,
        latency: Duration,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<FetchOutcome>) -> Arc<Self> {
            Self::slow(Duration::ZERO, script)
        }

        fn slow(latency: Duration, script: Vec<FetchOutcome>) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(script.into()), latency, ..Default::default() })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<Validators> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RevalidatingFetcher for ScriptedFetcher {
        async fn fetch(&self, _locator: &url::Url, validators: &Validators) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(validators.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(FetchOutcome::Failed(FetchError::Timeout))
        }
    }

    fn options(ttl: Duration) -> ResourceOptions {
        ResourceOptions {
            ttl,
            retry: RetryPolicy::new(2, Duration::from_millis(100), Backoff::Doubling),
            deadline: Duration::from_secs(30),
            limiter: None,
        }
    }

    fn resource(store: &MemoryStore, fetcher: &Arc<ScriptedFetcher>, options: ResourceOptions) -> CachedResource<Listing> {
        let fetcher: Arc<dyn RevalidatingFetcher> = Arc::clone(fetcher) as Arc<dyn RevalidatingFetcher>;
        CachedResource::new(Listing, Arc::new(store.clone()), fetcher, options)
    }

    async fn seed(store: &MemoryStore, key: &str, value: &[&str]) {
        let cache_key = Listing.cache_key(&key.to_string());
        store
            .put(&cache_key, serde_json::to_string(value).unwrap())
            .await
            .unwrap();
    }

    fn listing(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cold_fetch_then_hit() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::fresh("a,b")]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["a", "b"]));
        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["a", "b"]));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fetcher.seen()[0], Validators::none());
    }

    #[tokio::test]
    async fn test_fresh_entry_never_fetches() {
        let store = MemoryStore::new();
        seed(&store, "x", &["old"]).await;
        let fetcher = ScriptedFetcher::new(vec![]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        let results = join_all((0..8).map(|_| res.get("x".into()))).await;
        assert!(results.into_iter().all(|r| r.unwrap() == listing(&["old"])));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cold_gets_share_one_fetch() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::slow(Duration::from_millis(50), vec![FetchOutcome::fresh("x")]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        let results = join_all((0..10).map(|_| res.get("k".into()))).await;
        assert!(results.into_iter().all(|r| r.unwrap() == listing(&["x"])));
        assert_eq!(fetcher.calls(), 1);
        assert!(res.inner.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_keys_do_not_wait() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::slow(
            Duration::from_millis(100),
            vec![FetchOutcome::fresh("a"), FetchOutcome::fresh("b")],
        );
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));
        let start = Instant::now();

        let (a, b) = tokio::join!(res.get("a".into()), res.get("b".into()));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fetcher.calls(), 2);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_single_attempt() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::Failed(FetchError::NotFound { status: 404 })]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        let result = res.get("gone".into()).await;
        assert!(matches!(result, Err(ResourceError::NotFound(_))));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_unusable_locator_is_not_found() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::fresh("a")]);
        let res = resource(&store, &fetcher, options(Duration::ZERO));

        let result = res.get("raw:ftp://provider.test/x".into()).await;
        assert!(matches!(result, Err(ResourceError::NotFound(_))));
        assert_eq!(fetcher.calls(), 0);

        seed(&store, "raw:  ", &["old"]).await;
        assert_eq!(res.get("raw:  ".into()).await.unwrap(), listing(&["old"]));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_prefers_stale_value() {
        let store = MemoryStore::new();
        seed(&store, "x", &["old"]).await;
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::Failed(FetchError::NotFound { status: 410 })]);
        let res = resource(&store, &fetcher, options(Duration::ZERO));

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["old"]));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_after_exhausted_retries() {
        let store = MemoryStore::new();
        seed(&store, "x", &["old"]).await;
        let fetcher = ScriptedFetcher::new(vec![]);
        let res = resource(&store, &fetcher, options(Duration::ZERO));

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["old"]));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_transient_failure_is_unavailable() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        let result = res.get("x".into()).await;
        assert!(matches!(result, Err(ResourceError::Unavailable(_))));
        assert_eq!(fetcher.calls(), 3);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_parse_error_is_not_cached() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::fresh("!broken")]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        assert!(matches!(res.get("x".into()).await, Err(ResourceError::Parse(_))));
        assert_eq!(fetcher.calls(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_previous_value() {
        let store = MemoryStore::new();
        seed(&store, "x", &["old"]).await;
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::fresh("!broken")]);
        let res = resource(&store, &fetcher, options(Duration::ZERO));

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["old"]));
        let stored = store
            .get(&Listing.cache_key(&"x".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload, r#"["old"]"#);
    }

    #[tokio::test]
    async fn test_etag_stored_and_sent_on_revalidation() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![
            FetchOutcome::Fresh(Fresh { bytes: Bytes::from_static(b"v"), etag: Some("\"1\"".into()) }),
            FetchOutcome::NotModified,
        ]);
        let res = resource(&store, &fetcher, options(Duration::ZERO));
        let cache_key = Listing.cache_key(&"a".to_string());

        assert_eq!(res.get("a".into()).await.unwrap(), listing(&["v"]));
        assert_eq!(
            store.revalidation_token("http://provider.test/a").await.unwrap().as_deref(),
            Some("\"1\"")
        );
        let first = store.get(&cache_key).await.unwrap().unwrap();

        assert_eq!(res.get("a".into()).await.unwrap(), listing(&["v"]));
        let second = store.get(&cache_key).await.unwrap().unwrap();

        let seen = fetcher.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Validators::none());
        assert_eq!(seen[1].token.as_deref(), Some("\"1\""));
        assert!(seen[1].last_modified.is_some());
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_not_modified_without_entry_is_unavailable() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::NotModified]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        assert!(matches!(res.get("a".into()).await, Err(ResourceError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_timing() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![
            FetchOutcome::Failed(FetchError::Timeout),
            FetchOutcome::Failed(FetchError::Status { status: 503 }),
            FetchOutcome::fresh("ok"),
        ]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));
        let start = Instant::now();

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["ok"]));
        assert_eq!(fetcher.calls(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(320));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_whole_retry_loop() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![]);
        let mut opts = options(Duration::from_secs(3600));
        opts.retry = RetryPolicy::new(5, Duration::from_millis(100), Backoff::Doubling);
        opts.deadline = Duration::from_millis(250);
        let res = resource(&store, &fetcher, opts);
        let start = Instant::now();

        assert!(matches!(res.get("x".into()).await, Err(ResourceError::Unavailable(_))));
        assert_eq!(fetcher.calls(), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250) && elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_applies_per_attempt() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new(vec![FetchOutcome::Failed(FetchError::Timeout), FetchOutcome::fresh("ok")]);
        let mut opts = options(Duration::from_secs(3600));
        opts.retry = RetryPolicy::new(2, Duration::from_millis(10), Backoff::Fixed);
        opts.limiter = Some(RateLimiter::new(1, Duration::from_secs(1)));
        let res = resource(&store, &fetcher, opts);
        let start = Instant::now();

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["ok"]));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_flight_does_not_block_key() {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::slow(Duration::from_millis(100), vec![FetchOutcome::fresh("late")]);
        let res = resource(&store, &fetcher, options(Duration::from_secs(3600)));

        let abandoned = tokio::time::timeout(Duration::from_millis(10), res.get("x".into())).await;
        assert!(abandoned.is_err());
        assert!(res.inner.inflight.lock().unwrap().is_empty());

        assert_eq!(res.get("x".into()).await.unwrap(), listing(&["late"]));
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_error_mapping() {
        let e: ResourceError = FetchError::NotFound { status: 404 }.into();
        assert!(matches!(e, ResourceError::NotFound(_)));
        let e: ResourceError = FetchError::Status { status: 500 }.into();
        assert!(matches!(e, ResourceError::Unavailable(_)));

        let core: metacache_core::Error = ResourceError::Parse("bad".into()).into();
        assert!(core.to_string().starts_with("PARSE_ERROR"));
        let core: metacache_core::Error = ResourceError::Unavailable("down".into()).into();
        assert!(core.to_string().starts_with("UNAVAILABLE"));
        let core: metacache_core::Error = ResourceError::NotFound("gone".into()).into();
        assert!(core.to_string().starts_with("NOT_FOUND"));
    }
}
