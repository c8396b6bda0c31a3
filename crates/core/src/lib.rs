//! Core types and shared functionality for metacache.
//!
//! This crate provides:
//! - Cache keys, entries and the `CacheStore` abstraction
//! - SQLite and in-memory store implementations
//! - Provider-scoped result caching
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    CacheDb, CacheEntry, CacheKey, CacheLookup, CacheStore, LogicalKey, MemoryStore, ResultCache, StoredEntry,
};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
