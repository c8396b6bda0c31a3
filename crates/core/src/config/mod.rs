//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (METACACHE_*)
//! 2. TOML config file (if METACACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (METACACHE_*)
/// 2. TOML config file (if METACACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via METACACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for a whole fetch, including every retry, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Maximum bytes to accept per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Number of retries after the first failed attempt.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Delay before the first retry in milliseconds; doubled on every further retry.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Requests allowed per rate-limit window.
    #[serde(default = "default_rate_limit_permits")]
    pub rate_limit_permits: usize,

    /// Rate-limit window in milliseconds.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    /// Time-to-live of bulk catalogs (title dumps) in seconds.
    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,

    /// Time-to-live of cached search results and provider payloads in seconds.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Minimum similarity for a fuzzy (non-substring) search hit.
    #[serde(default = "default_search_min_similarity")]
    pub search_min_similarity: f32,

    /// Maximum number of records returned by a local search.
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,

    /// Locator of the AniDB anime title dump.
    ///
    /// Set via METACACHE_ANIDB_TITLES_URL environment variable.
    #[serde(default = "default_anidb_titles_url")]
    pub anidb_titles_url: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./metacache.sqlite")
}

fn default_user_agent() -> String {
    "metacache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_deadline_ms() -> u64 {
    60_000
}

fn default_max_bytes() -> usize {
    33_554_432 // 32MB
}

fn default_retry_limit() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_rate_limit_permits() -> usize {
    35
}

fn default_rate_limit_window_ms() -> u64 {
    10_000
}

fn default_catalog_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_result_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_search_min_similarity() -> f32 {
    0.5
}

fn default_search_result_limit() -> usize {
    20
}

fn default_anidb_titles_url() -> String {
    "http://anidb.net/api/anime-titles.dat.gz".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            deadline_ms: default_deadline_ms(),
            max_bytes: default_max_bytes(),
            retry_limit: default_retry_limit(),
            retry_delay_ms: default_retry_delay_ms(),
            rate_limit_permits: default_rate_limit_permits(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            catalog_ttl_secs: default_catalog_ttl_secs(),
            result_ttl_secs: default_result_ttl_secs(),
            search_min_similarity: default_search_min_similarity(),
            search_result_limit: default_search_result_limit(),
            anidb_titles_url: default_anidb_titles_url(),
        }
    }
}

impl AppConfig {
    /// Per-request timeout as Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Bound on a whole fetch including retries.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `METACACHE_`
    /// 2. TOML file from `METACACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("METACACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("METACACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
