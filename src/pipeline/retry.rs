//! Bounded retry with exponential backoff around a backend call.
//!
//! Only errors accepted by the policy's predicate are retried (by default
//! [`BackendError::is_transient`]). Everything else propagates on the first
//! attempt. When the attempts run out, the last transient error is returned.

use std::time::Duration;

use serde::Serialize;

use super::backend::{BackendError, LlmBackend};
use crate::config::{DEFAULT_BASE_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF};

#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Zero is treated as one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub retryable: fn(&BackendError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retryable: BackendError::is_transient,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff", &self.base_backoff)
            .field("max_backoff", &self.max_backoff)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping. For tests and dry runs.
    pub fn without_backoff() -> Self {
        Self {
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait after failed attempt `attempt` (1-based): `min(max, base * 2^(attempt-1))`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// One call made by [`invoke_with_retry_traced`].
#[derive(Debug, Clone, Serialize)]
pub struct InvocationAttempt {
    /// 1-based attempt number.
    pub ordinal: u32,
    /// Wait taken after this attempt (zero when no retry followed).
    pub backoff: Duration,
    pub outcome: AttemptOutcome,
}

/// Call the backend, retrying retryable failures per `policy`.
pub fn invoke_with_retry(
    backend: &dyn LlmBackend,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String, BackendError> {
    invoke_with_retry_traced(backend, prompt, policy).0
}

/// Like [`invoke_with_retry`] but also returns the attempt log.
pub fn invoke_with_retry_traced(
    backend: &dyn LlmBackend,
    prompt: &str,
    policy: &RetryPolicy,
) -> (Result<String, BackendError>, Vec<InvocationAttempt>) {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = Vec::with_capacity(max_attempts as usize);

    for ordinal in 1..=max_attempts {
        match backend.invoke(prompt) {
            Ok(text) => {
                attempts.push(InvocationAttempt {
                    ordinal,
                    backoff: Duration::ZERO,
                    outcome: AttemptOutcome::Success,
                });
                if ordinal > 1 {
                    tracing::info!(
                        model = %backend.model_name(),
                        attempt = ordinal,
                        "Backend call succeeded after retry"
                    );
                }
                return (Ok(text), attempts);
            }
            Err(e) if !(policy.retryable)(&e) => {
                attempts.push(InvocationAttempt {
                    ordinal,
                    backoff: Duration::ZERO,
                    outcome: AttemptOutcome::PermanentFailure,
                });
                tracing::error!(
                    model = %backend.model_name(),
                    attempt = ordinal,
                    error = %e,
                    "Backend call failed with non-retryable error"
                );
                return (Err(e), attempts);
            }
            Err(e) if ordinal == max_attempts => {
                attempts.push(InvocationAttempt {
                    ordinal,
                    backoff: Duration::ZERO,
                    outcome: AttemptOutcome::TransientFailure,
                });
                tracing::error!(
                    model = %backend.model_name(),
                    attempts = ordinal,
                    error = %e,
                    "Backend call failed: retries exhausted"
                );
                return (Err(e), attempts);
            }
            Err(e) => {
                let backoff = policy.backoff_for(ordinal);
                attempts.push(InvocationAttempt {
                    ordinal,
                    backoff,
                    outcome: AttemptOutcome::TransientFailure,
                });
                tracing::warn!(
                    model = %backend.model_name(),
                    attempt = ordinal,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Backend call failed, retrying"
                );
                if !backoff.is_zero() {
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    // max_attempts >= 1, so the loop always returns.
    (
        Err(BackendError::Transient("no attempt was made".into())),
        attempts,
    )
}
