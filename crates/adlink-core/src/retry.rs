//! Retry engine with exponential backoff.
//!
//! Every remote directory call in adlink runs through [`with_retry`]. The
//! backoff sleep races the caller's cancellation token so a cancelled
//! operation aborts promptly instead of finishing its sleep.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DirectoryError, DirectoryResult};

/// Configuration for retry behavior. Consumed per remote operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// Ceiling on the delay between attempts.
    pub max_backoff: Duration,
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Policy that attempts each operation exactly once.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_factor;
        Duration::from_secs_f64(scaled.min(self.max_backoff.as_secs_f64()))
    }
}

/// Execute `op` up to `policy.max_retries + 1` times.
///
/// A non-retryable failure returns immediately with the operation label
/// filled in. A retryable failure sleeps for the current backoff (racing the
/// cancellation token), scales the backoff, and tries again. When the final
/// attempt still fails the result is a terminal, non-retryable
/// retries-exhausted error wrapping the last underlying failure.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> DirectoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DirectoryResult<T>>,
{
    let mut backoff = policy.initial_backoff;
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if cancel.is_cancelled() {
            return Err(DirectoryError::cancelled(operation));
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if e.is_cancelled() || !e.is_retryable() {
                    return Err(e.with_operation(operation));
                }
                if attempt == policy.max_retries {
                    last_error = Some(e);
                    break;
                }

                debug!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(DirectoryError::cancelled(operation));
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = policy.next_backoff(backoff);
            }
        }
    }

    let last = last_error
        .unwrap_or_else(|| DirectoryError::server(operation, "retry budget exhausted", false));
    Err(DirectoryError::retries_exhausted(
        operation,
        policy.max_retries + 1,
        last,
    ))
}
