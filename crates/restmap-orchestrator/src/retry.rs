use std::future::Future;
use std::time::Duration;

use restmap_executor::ExecutorError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::OrchestrationError;

/// Bounded exponential backoff for executor calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 4,
      base_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(10),
    }
  }
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      ..Self::default()
    }
  }

  /// Delay after the given failed attempt (1-based).
  pub fn compute_backoff(&self, attempt: u32) -> Duration {
    let base_ms = self.base_delay.as_millis() as u64;
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms).min(self.max_delay)
  }
}

/// Run an executor call, retrying retryable backend failures.
///
/// Cancellation is checked before every attempt and interrupts the backoff
/// sleep.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  cancel: &CancellationToken,
  operation: &str,
  mut call: F,
) -> Result<T, OrchestrationError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ExecutorError>>,
{
  let mut attempt = 1;
  loop {
    if cancel.is_cancelled() {
      return Err(OrchestrationError::Cancelled);
    }

    match call().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
        let delay = policy.compute_backoff(attempt);
        warn!(
          operation,
          attempt,
          delay_ms = delay.as_millis() as u64,
          error = %e,
          "executor call failed, retrying"
        );
        tokio::select! {
          _ = tokio::time::sleep(delay) => {}
          _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
        }
        attempt += 1;
      }
      Err(source) => {
        return Err(OrchestrationError::Executor {
          operation: operation.to_string(),
          source,
        });
      }
    }
  }
}
