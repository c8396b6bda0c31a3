//! Client side of metacache.
//!
//! This crate turns unreliable provider endpoints into cached, revalidating
//! resources and searches bulk catalogs offline:
//!
//! - Conditional HTTP fetches and locator canonicalization
//! - Flood limiting, bounded retry and the `CachedResource` orchestration
//! - `LocalSearch`, a concurrent fuzzy index over catalog snapshots
//! - The AniDB title catalog built on top of both

pub mod fetch;
pub mod limit;
pub mod resource;
pub mod retry;
pub mod search;
pub mod titles;

pub use fetch::{FetchConfig, FetchError, FetchOutcome, HttpFetcher, RevalidatingFetcher, Validators};
pub use limit::RateLimiter;
pub use resource::{CachedResource, ResourceDescriptor, ResourceError, ResourceOptions};
pub use retry::{Backoff, RetryPolicy};
pub use search::{CancelFlag, Cancelled, LocalSearch, Scored};
pub use titles::{AnimeTitlesResource, TitleCatalog, TitleRecord, parse_titles};
