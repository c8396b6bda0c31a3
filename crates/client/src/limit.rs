//! Flood limiting for remote endpoints.
//!
//! A permit is held for a fixed window after it was taken, not until the
//! caller is done with it. This bounds the number of operations per window
//! rather than the number of concurrent operations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    window: Duration,
}

impl RateLimiter {
    /// At most `permits` acquisitions within any `window`.
    pub fn new(permits: usize, window: Duration) -> Self {
        let capacity = permits.max(1);
        Self { permits: Arc::new(Semaphore::new(capacity)), capacity, window }
    }

    pub fn from_app_config(config: &metacache_core::AppConfig) -> Self {
        Self::new(config.rate_limit_permits, config.rate_limit_window())
    }

    /// Wait for a permit. The permit returns to the pool once the window has elapsed.
    pub async fn acquire(&self) {
        // the semaphore is never closed
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };

        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            drop(permit);
        });
    }

    /// Permits that can be taken right now without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
