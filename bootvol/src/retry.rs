//! Bounded retry with capped exponential backoff.
//!
//! Only wrap idempotent host calls (pool refresh and the like); the policy
//! re-invokes the operation without any compensation between attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Retry policy for transient host failures.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Returned when every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub description: String,
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (gave up after {} attempts): {}",
            self.description, self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff before retry number `attempt` (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        if !backoff_ms.is_finite() || backoff_ms >= self.max_backoff.as_millis() as f64 {
            return self.max_backoff;
        }
        Duration::from_millis(backoff_ms as u64)
    }

    /// Run `op` until it succeeds or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, description: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < max_attempts => {
                    let backoff = self.backoff_for_attempt(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "{}, retrying",
                        description
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RetryExhausted {
                        description: description.to_string(),
                        attempts: attempt + 1,
                        last_error: e,
                    });
                }
            }
        }
    }
}
