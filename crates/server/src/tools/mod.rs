//! MCP tool implementations.
//!
//! This module contains all tools exposed by the metacache server.

pub mod cache;
pub mod title_search;

pub use title_search::{TitleSearchParams, search_impl};
