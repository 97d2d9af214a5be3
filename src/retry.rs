//! Bounded exponential-backoff retry around a single upstream call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Failure classification consulted by [`with_retry`].
pub trait Retryable {
    /// Rate limits and transient transport failures return true; anything
    /// else surfaces immediately.
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff before retry `n` is `unit * 2^n`.
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            unit: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, unit: Duration) -> Self {
        Self { max_retries, unit }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Invoke `call` until it succeeds, fails terminally, or exhausts `max_retries`.
///
/// The sleep suspends only the calling task; sibling futures joined alongside
/// keep making progress.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retries = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                debug!(
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(retries, error = %e, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
