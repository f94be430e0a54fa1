//! Bounded retry with jittered exponential backoff.
//!
//! Used by the source client and the metadata store around every remote
//! call. Only errors that report themselves as retryable are retried, and
//! never more than `max_attempts` times in total.

use backon::{ExponentialBuilder, Retryable as _};
use std::{
    fmt::Display,
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Single attempt, no sleeping.
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff schedule: one delay per retry after the first attempt.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned as-is.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let retries = AtomicU32::new(0);
        let result = op
            .retry(self.backoff())
            .when(|err: &E| err.is_retryable())
            .notify(|err: &E, delay: Duration| {
                let attempt = retries.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error: {}",
                    err
                );
            })
            .await;

        if let Err(err) = &result {
            if err.is_retryable() {
                let attempts = retries.load(Ordering::Relaxed) + 1;
                warn!(operation, attempts, "giving up after {} attempts: {}", attempts, err);
            }
        }
        result
    }
}
