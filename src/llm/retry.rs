//! Retry discipline for completion calls
//!
//! Failed requests are resent unchanged after a backoff delay. The policy is a
//! plain value so callers and tests can pick fixed or growing delays and an
//! optional attempt ceiling.

use super::{LlmError, LlmRequest, LlmResponse, LlmService, MISSING_API_KEY_WARNING};
use std::time::Duration;

/// Delay between consecutive attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// `initial` after the first failure, growing by `step` per further failure
    Linear { initial: Duration, step: Duration },
}

impl Backoff {
    /// Delay to wait after the `failures`-th consecutive failure (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { initial, step } => {
                initial.saturating_add(step.saturating_mul(failures.saturating_sub(1)))
            }
        }
    }
}

/// Backoff plus an optional ceiling on total attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const CHAT_DELAY: Duration = Duration::from_millis(500);

    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            max_attempts: None,
        }
    }

    pub fn linear(initial: Duration, step: Duration) -> Self {
        Self {
            backoff: Backoff::Linear { initial, step },
            max_attempts: None,
        }
    }

    /// Short fixed delay, unbounded
    pub fn chat() -> Self {
        Self::fixed(Self::CHAT_DELAY)
    }

    /// Growing delay (2s, 3s, 4s, ...), unbounded
    pub fn self_check() -> Self {
        Self::linear(Duration::from_secs(2), Duration::from_secs(1))
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn delay_for(&self, failures: u32) -> Duration {
        self.backoff.delay(failures)
    }

    /// Whether another attempt may follow `attempt` failed attempts
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::chat()
    }
}

/// Send `request` until it succeeds or the policy's ceiling is reached.
///
/// Every failure is logged, and the credential warning is repeated while no
/// API key is configured. The last error is returned only when the ceiling is
/// hit; with an unbounded policy this future resolves only on success.
pub async fn complete_with_retry<L: LlmService + ?Sized>(
    llm: &L,
    request: &LlmRequest,
    policy: &RetryPolicy,
) -> Result<LlmResponse, LlmError> {
    retry_loop(llm, request, policy).await.0
}

/// Retry loop shared with the connectivity probe; also reports attempts made
pub(crate) async fn retry_loop<L: LlmService + ?Sized>(
    llm: &L,
    request: &LlmRequest,
    policy: &RetryPolicy,
) -> (Result<LlmResponse, LlmError>, u32) {
    let mut attempt: u32 = 1;
    loop {
        match llm.complete(request).await {
            Ok(response) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Completion request succeeded after retry");
                }
                return (Ok(response), attempt);
            }
            Err(e) => {
                tracing::error!(attempt, kind = ?e.kind, error = %e, "Completion attempt failed");
                if !llm.has_credentials() {
                    tracing::warn!("{MISSING_API_KEY_WARNING}");
                }
                if !policy.allows_retry(attempt) {
                    tracing::warn!(attempt, "Giving up on completion request");
                    return (Err(e), attempt);
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = %delay.as_millis(), "Retrying completion request");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
