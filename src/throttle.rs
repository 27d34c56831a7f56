//! Spacing between post detail fetches.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

/// Minimum pause Piazza tolerates between detail fetches.
pub const MIN_DETAIL_DELAY: Duration = Duration::from_secs(1);

/// Awaited once before every post detail fetch.
#[async_trait]
pub trait DetailThrottle: Send + Sync {
    async fn wait(&self);
}

/// Sleeps a fixed delay before each fetch.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    /// Create a throttle that pauses `delay`, never less than [`MIN_DETAIL_DELAY`].
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.max(MIN_DETAIL_DELAY),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(MIN_DETAIL_DELAY)
    }
}

#[async_trait]
impl DetailThrottle for FixedDelay {
    async fn wait(&self) {
        sleep(self.delay).await;
    }
}
