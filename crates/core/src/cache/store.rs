//! The storage abstraction shared by every cache backend.
//!
//! Backends store opaque JSON payloads; typed access goes through [`lookup`],
//! which turns the raw row into a [`CacheLookup`] and never fails outright.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::key::CacheKey;
use crate::Error;

/// One stored row as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Canonical key recorded alongside the payload.
    pub key: String,
    /// JSON-encoded value.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// The later of creation and update time; drives `If-Modified-Since`.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.created_at.max(self.updated_at)
    }

    /// Whether the entry has reached its TTL as of `now`.
    pub fn is_stale_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        now - self.last_modified() >= ttl
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.is_stale_at(ttl, Utc::now())
    }
}

/// Result of a typed lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    Hit(CacheEntry<V>),
    Miss,
    /// A row exists but cannot be used: its recorded key differs from the
    /// requested one or its payload no longer decodes.
    Corrupt(String),
}

impl<V> CacheLookup<V> {
    /// The usable entry, if any. Corrupt rows count as misses.
    pub fn into_entry(self) -> Option<CacheEntry<V>> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss | CacheLookup::Corrupt(_) => None,
        }
    }
}

/// Durable key/value storage for cached resources.
///
/// `put` must be atomic per key: a concurrent `get` observes either the old
/// or the new row.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the raw row for a key.
    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, Error>;

    /// Insert or overwrite the payload for a key, keeping `created_at` of an existing row.
    async fn put(&self, key: &CacheKey, payload: String) -> Result<(), Error>;

    /// Revalidation token (ETag) last seen for a locator.
    async fn revalidation_token(&self, locator: &str) -> Result<Option<String>, Error>;

    async fn put_revalidation_token(&self, locator: &str, token: &str) -> Result<(), Error>;
}

/// Look up and decode a typed entry.
///
/// Storage failures are logged and reported as a miss; the cache is an
/// optimization, never a correctness dependency.
pub async fn lookup<V: DeserializeOwned>(store: &dyn CacheStore, key: &CacheKey) -> CacheLookup<V> {
    let stored = match store.get(key).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return CacheLookup::Miss,
        Err(e) => {
            tracing::warn!(key = %key, "cache lookup failed: {}", e);
            return CacheLookup::Miss;
        }
    };

    if stored.key != key.as_str() {
        tracing::warn!(key = %key, stored = %stored.key, "cache row key mismatch");
        return CacheLookup::Corrupt(format!("stored key {} does not match", stored.key));
    }

    match serde_json::from_str::<V>(&stored.payload) {
        Ok(value) => CacheLookup::Hit(CacheEntry {
            key: key.clone(),
            value,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }),
        Err(e) => {
            tracing::warn!(key = %key, "cached payload no longer decodes: {}", e);
            CacheLookup::Corrupt(e.to_string())
        }
    }
}

/// Fixed-width RFC 3339 form so SQL string comparison matches time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::LogicalKey;

    fn entry_at(t0: DateTime<Utc>) -> CacheEntry<u32> {
        CacheEntry {
            key: CacheKey::new("p", "c", None, LogicalKey::id("k")),
            value: 1,
            created_at: t0,
            updated_at: t0,
        }
    }

    #[test]
    fn test_staleness_boundary() {
        let t0 = Utc::now();
        let ttl = Duration::from_secs(60);
        let entry = entry_at(t0);

        assert!(!entry.is_stale_at(ttl, t0));
        assert!(!entry.is_stale_at(ttl, t0 + chrono::Duration::milliseconds(59_999)));
        assert!(entry.is_stale_at(ttl, t0 + chrono::Duration::seconds(60)));
        assert!(entry.is_stale_at(ttl, t0 + chrono::Duration::days(1)));
    }

    #[test]
    fn test_zero_ttl_is_always_stale() {
        let t0 = Utc::now();
        assert!(entry_at(t0).is_stale_at(Duration::ZERO, t0));
    }

    #[test]
    fn test_last_modified_prefers_update() {
        let t0 = Utc::now();
        let mut entry = entry_at(t0);
        entry.updated_at = t0 + chrono::Duration::seconds(5);
        assert_eq!(entry.last_modified(), entry.updated_at);
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(1);
        let (fa, fb) = (format_timestamp(&a), format_timestamp(&b));
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fa).unwrap().timestamp_millis(), a.timestamp_millis());
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(matches!(parse_timestamp("yesterday"), Err(Error::Serialization(_))));
    }
}
