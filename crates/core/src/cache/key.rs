//! Cache key construction and hashing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The logical part of a cache key.
///
/// Free-text queries are normalized so that `" Firefly "` and `"firefly"`
/// share an entry; structured identifiers are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalKey {
    Query(String),
    Id(String),
}

impl LogicalKey {
    pub fn query(text: impl AsRef<str>) -> Self {
        LogicalKey::Query(text.as_ref().trim().to_lowercase())
    }

    pub fn id(id: impl Into<String>) -> Self {
        LogicalKey::Id(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            LogicalKey::Query(q) => q,
            LogicalKey::Id(id) => id,
        }
    }
}

/// Stable identifier of one cached value.
///
/// The canonical form is a JSON array `[provider, category, locale, key]`,
/// so field boundaries survive any characters the parts contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    canonical: String,
}

impl CacheKey {
    pub fn new(provider: &str, category: &str, locale: Option<&str>, key: LogicalKey) -> Self {
        let locale = locale.map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty());
        let canonical = serde_json::json!([provider, category, locale, key.as_str()]).to_string();
        Self { canonical }
    }

    /// Rebuild a key from its canonical form as read back from storage.
    pub fn from_canonical(canonical: impl Into<String>) -> Self {
        Self { canonical: canonical.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// SHA-256 hex digest of the canonical form, used as the storage row id.
    pub fn hash(&self) -> String {
        compute_key_hash(&self.canonical)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Compute the storage hash for a canonical key string.
pub fn compute_key_hash(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
