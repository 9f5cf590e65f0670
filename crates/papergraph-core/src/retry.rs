//! Bounded retry on rate limiting with a linear backoff schedule.
//!
//! Attempt `n` that fails with a rate-limit error waits `step × n` before the
//! next attempt (10s, 20s, ... with the default step). Any other error, or a
//! rate-limit error on the final attempt, is returned to the caller as-is.

use std::time::Duration;

use crate::IngestEvent;
use crate::llm::{CompletionBackend, LlmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10))
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait applied after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Call `backend` with `prompt`, retrying rate-limited attempts per `policy`.
pub async fn complete_with_retry(
    backend: &dyn CompletionBackend,
    prompt: &str,
    policy: &RetryPolicy,
    progress: &dyn Fn(IngestEvent),
) -> Result<String, LlmError> {
    let mut attempt = 1;
    loop {
        match backend.complete(prompt).await {
            Ok(reply) => return Ok(reply),
            Err(e) if e.is_rate_limit() && attempt < policy.max_attempts => {
                let wait = policy.backoff_for(attempt);
                tracing::warn!(
                    attempt,
                    wait_secs = wait.as_secs(),
                    error = %e,
                    "rate limited, backing off"
                );
                progress(IngestEvent::RateLimitWait { attempt, wait });
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "completion failed");
                return Err(e);
            }
        }
    }
}
