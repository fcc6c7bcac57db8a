//! Bounded exponential backoff for backend writes.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use crate::config::BackendConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base: Duration::from_millis(config.retry_base_ms),
            max: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base… capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Run `op` until it succeeds or the attempts are used up. Returns the
    /// last error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay(attempt);
                    tracing::debug!(backend = label, attempt, ?delay, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
