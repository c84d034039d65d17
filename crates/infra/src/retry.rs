//! Bounded retries for calls to external collaborators.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::external::ExternalError;

/// Exponential backoff with a cap, deterministic jitter and a per-call timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0).
    pub jitter: f64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: 0.1,
            timeout_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Tight policy for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
            timeout_ms: 1_000,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay_ms as f64;
        let max_ms = self.max_delay_ms as f64;
        let exp = 2_f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_range = delay_ms * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Runs `call` under the policy.
///
/// Each attempt is bounded by the policy timeout. `Transient` and `Timeout`
/// failures are retried with backoff; anything else returns immediately. Once
/// the attempts are used up the result is `RetriesExhausted` carrying the last
/// failure.
pub async fn retry_external<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ExternalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExternalError>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(ExternalError::Timeout {
                operation: operation.to_string(),
                after_ms: policy.timeout_ms,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if !policy.should_retry(attempt) {
                    return Err(ExternalError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "external call failed; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
