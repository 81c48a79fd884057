//! Bounded exponential-backoff retry around a single backend call.
//!
//! The controller is the only place retry decisions happen: call sites wrap
//! their operation in [`call_with_retry`] and never hand-roll loops. Whether
//! a failure is worth retrying is the policy table on
//! [`BackendErrorKind`](crate::error::BackendErrorKind), not anything
//! inferred from the error's shape at the call site.
//!
//! Each attempt runs under a per-attempt timeout; an elapsed attempt counts
//! as a retryable failure and consumes one attempt from the budget.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{BackendError, BackendErrorKind};

/// Retry behavior for one logical backend call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Budget for a single attempt before it is treated as a timeout.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(retry: &crate::config::RetryConfig, backend: &crate::config::BackendConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            attempt_timeout: Duration::from_secs(backend.timeout_secs),
        }
    }

    /// Delay before the attempt following `failed_attempts` failures:
    /// `base * 2^(failed_attempts - 1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Run `op` with retry per `policy`.
///
/// Returns the first success, or the first non-retryable error immediately,
/// or the last retryable error once the attempt budget is exhausted.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut last_err: Option<BackendError> = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.backoff_delay(attempt - 1);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }

        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::new(
                BackendErrorKind::Timeout,
                format!(
                    "attempt timed out after {}s",
                    policy.attempt_timeout.as_secs()
                ),
            )),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "backend call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() => {
                warn!(attempt, kind = ?e.kind, "retryable backend failure");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| BackendError::new(BackendErrorKind::Overloaded, "retry budget exhausted")))
}
