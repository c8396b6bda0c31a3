//! Bounded retry with caller-supplied backoff.

use std::future::Future;
use std::time::Duration;

use crate::fetch::FetchOutcome;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after every retry.
    #[default]
    Doubling,
    Custom(fn(Duration) -> Duration),
}

impl Backoff {
    pub fn next(&self, delay: Duration) -> Duration {
        match self {
            Backoff::Fixed => delay,
            Backoff::Doubling => delay.saturating_mul(2),
            Backoff::Custom(f) => f(delay),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_limit: u32,
    pub initial_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retry_limit: 2, initial_delay: Duration::from_secs(2), backoff: Backoff::Doubling }
    }
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, initial_delay: Duration, backoff: Backoff) -> Self {
        Self { retry_limit, initial_delay, backoff }
    }

    pub fn from_app_config(config: &metacache_core::AppConfig) -> Self {
        Self::new(config.retry_limit, config.retry_delay(), Backoff::Doubling)
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    ///
    /// Only transient failures are retried. Dropping the returned future
    /// abandons the pending sleep or attempt.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> FetchOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let mut remaining = self.retry_limit;
        let mut delay = self.initial_delay;

        loop {
            let outcome = attempt().await;
            if !outcome.is_transient_failure() || remaining == 0 {
                return outcome;
            }

            if let FetchOutcome::Failed(e) = &outcome {
                tracing::debug!("attempt failed, retrying in {}ms ({} left): {}", delay.as_millis(), remaining, e);
            }

            tokio::time::sleep(delay).await;
            delay = self.backoff.next(delay);
            remaining -= 1;
        }
    }
}
