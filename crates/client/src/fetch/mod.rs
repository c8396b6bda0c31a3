//! Single-attempt conditional fetches.
//!
//! ### Outcomes
//! - `Fresh` carries the body and the response `ETag`, if any.
//! - `NotModified` is returned for `304`.
//! - `Failed` wraps a [`FetchError`]; only a missing resource (`404`/`410`)
//!   is permanent, everything else may succeed on retry.
//!
//! ### Conditional requests
//! - A revalidation token is sent as `If-None-Match` and suppresses
//!   `If-Modified-Since`; the two are never combined in one request.
//! - Without a token, a last-modified time is sent as `If-Modified-Since`.

pub mod url;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};

pub use self::url::{LocatorError, canonicalize};

/// Errors from a single fetch attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The resource does not exist (404/410).
    #[error("resource not found: HTTP {status}")]
    NotFound { status: u16 },

    /// Any other non-success status.
    #[error("HTTP error: {status}")]
    Status { status: u16 },

    #[error("request timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: usize, limit: usize },
}

impl FetchError {
    /// Permanent failures are never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchError::Timeout } else { FetchError::Network(Arc::new(err)) }
    }
}

/// Freshness markers sent with a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub last_modified: Option<DateTime<Utc>>,
    pub token: Option<String>,
}

impl Validators {
    pub fn none() -> Self {
        Self::default()
    }
}

/// A freshly fetched body.
#[derive(Debug, Clone)]
pub struct Fresh {
    pub bytes: Bytes,
    pub etag: Option<String>,
}

/// Result of one fetch attempt.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fresh(Fresh),
    NotModified,
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn fresh(bytes: impl Into<Bytes>) -> Self {
        FetchOutcome::Fresh(Fresh { bytes: bytes.into(), etag: None })
    }

    pub fn is_permanent_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failed(e) if e.is_permanent())
    }

    pub fn is_transient_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failed(e) if !e.is_permanent())
    }
}

/// Performs one attempt to retrieve a resource.
#[async_trait]
pub trait RevalidatingFetcher: Send + Sync {
    async fn fetch(&self, locator: &::url::Url, validators: &Validators) -> FetchOutcome;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "metacache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 32MB)
    pub max_bytes: usize,

    /// Per-request timeout (default: 20s)
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "metacache/0.1".to_string(), max_bytes: 32 * 1024 * 1024, timeout: Duration::from_secs(20) }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &metacache_core::AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), max_bytes: config.max_bytes, timeout: config.timeout() }
    }
}

/// reqwest-backed [`RevalidatingFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn attempt(&self, locator: &::url::Url, validators: &Validators) -> Result<FetchOutcome, FetchError> {
        let start = Instant::now();
        let mut request = self.http.get(locator.as_str());

        if let Some(token) = &validators.token {
            request = request.header(header::IF_NONE_MATCH, token);
        } else if let Some(since) = validators.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, http_date(&since));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!("{} not modified ({}ms)", locator, start.elapsed().as_millis());
            return Ok(FetchOutcome::NotModified);
        }

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            tracing::warn!("resource not found: {} => {}", locator, status);
            return Err(FetchError::NotFound { status: status.as_u16() });
        }

        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(FetchError::TooLarge { size: len as usize, limit: self.config.max_bytes });
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?;
        if bytes.len() > self.config.max_bytes {
            return Err(FetchError::TooLarge { size: bytes.len(), limit: self.config.max_bytes });
        }

        tracing::debug!("fetched {} in {}ms ({} bytes)", locator, start.elapsed().as_millis(), bytes.len());

        Ok(FetchOutcome::Fresh(Fresh { bytes, etag }))
    }
}

#[async_trait]
impl RevalidatingFetcher for HttpFetcher {
    async fn fetch(&self, locator: &::url::Url, validators: &Validators) -> FetchOutcome {
        self.attempt(locator, validators)
            .await
            .unwrap_or_else(FetchOutcome::Failed)
    }
}

/// IMF-fixdate as required by `If-Modified-Since`.
fn http_date(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
