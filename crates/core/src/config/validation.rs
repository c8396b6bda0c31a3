//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `deadline_ms` is less than 100ms
    /// - `max_bytes` is 0 or exceeds 256MB
    /// - the rate limit has no permits or an empty window
    /// - `search_min_similarity` lies outside `[0, 1]`
    /// - `search_result_limit` is 0
    /// - `user_agent` or `anidb_titles_url` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.deadline_ms < 100 {
            return Err(invalid("deadline_ms", "must be at least 100ms"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 256 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 256MB"));
        }

        if self.rate_limit_permits == 0 {
            return Err(invalid("rate_limit_permits", "must be at least 1"));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(invalid("rate_limit_window_ms", "must be at least 1ms"));
        }

        if !(0.0..=1.0).contains(&self.search_min_similarity) {
            return Err(invalid("search_min_similarity", "must be between 0 and 1"));
        }
        if self.search_result_limit == 0 {
            return Err(invalid("search_result_limit", "must be at least 1"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.anidb_titles_url.trim().is_empty() {
            return Err(invalid("anidb_titles_url", "must not be empty"));
        }

        if self.deadline_ms < self.timeout_ms {
            tracing::warn!(
                deadline_ms = self.deadline_ms,
                timeout_ms = self.timeout_ms,
                "deadline_ms is shorter than timeout_ms; \
                 a single slow request will exhaust the whole fetch deadline"
            );
        }

        Ok(())
    }
}
