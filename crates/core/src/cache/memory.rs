//! In-memory cache store.
//!
//! Holds rows in a `HashMap` behind a tokio `RwLock`. Nothing survives the
//! process; useful for short-lived tools and for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::key::CacheKey;
use super::store::{CacheStore, StoredEntry};
use crate::Error;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, Error> {
        Ok(self.entries.read().await.get(key.as_str()).cloned())
    }

    async fn put(&self, key: &CacheKey, payload: String) -> Result<(), Error> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let created_at = entries.get(key.as_str()).map_or(now, |e| e.created_at);
        entries.insert(
            key.as_str().to_string(),
            StoredEntry { key: key.as_str().to_string(), payload, created_at, updated_at: now },
        );
        Ok(())
    }

    async fn revalidation_token(&self, locator: &str) -> Result<Option<String>, Error> {
        Ok(self.tokens.read().await.get(locator).cloned())
    }

    async fn put_revalidation_token(&self, locator: &str, token: &str) -> Result<(), Error> {
        self.tokens
            .write()
            .await
            .insert(locator.to_string(), token.to_string());
        Ok(())
    }
}
