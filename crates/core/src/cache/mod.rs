//! Durable key/value cache for fetched provider resources.
//!
//! This module provides the storage half of the cached-resource engine:
//!
//! - Normalized, collision-free cache keys
//! - The `CacheStore` trait with SQLite (`CacheDb`) and in-memory backends
//! - Typed lookups that separate hits, misses and corrupt rows
//! - Revalidation tokens (ETags) stored per locator
//! - A provider-scoped `ResultCache` for small TTL-expired values

pub mod connection;
pub mod entries;
pub mod key;
pub mod memory;
pub mod migrations;
pub mod results;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use key::{CacheKey, LogicalKey};
pub use memory::MemoryStore;
pub use results::ResultCache;
pub use store::{CacheEntry, CacheLookup, CacheStore, StoredEntry, lookup};
