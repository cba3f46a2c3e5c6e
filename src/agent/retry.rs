//! Whole-turn retry with capped exponential backoff.
//!
//! Each attempt re-runs the turn from the beginning. Attempt state is
//! private to [`RetryController::execute`]; callers only ever see the
//! final value or a [`TurnError`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::AgentConfig;
use super::message::TokenUsage;
use crate::error::{AgentError, TurnError};

/// Attempt and backoff limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy taken from configuration.
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.backoff_base,
            max_delay: config.backoff_cap,
        }
    }

    /// Sleep after failed attempt `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

struct AttemptState {
    attempt_number: u32,
    last_error: Option<AgentError>,
    elapsed_backoff: Duration,
}

/// Drives a turn function under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    /// Controller for `policy`.
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `turn` with the 1-based attempt number until it succeeds,
    /// fails with a non-retryable error, or attempts run out.
    ///
    /// Cancellation is checked before each attempt and during backoff.
    /// A turn that itself returns [`AgentError::Cancelled`] ends the
    /// loop immediately. The controller does not see token usage, so
    /// [`TurnError::Exhausted`] carries an empty total for the caller
    /// to fill in.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut turn: F,
    ) -> Result<(T, u32), TurnError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = AttemptState {
            attempt_number: 0,
            last_error: None,
            elapsed_backoff: Duration::ZERO,
        };

        while state.attempt_number < max_attempts {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }
            state.attempt_number += 1;
            let attempt = state.attempt_number;

            let error = match turn(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            attempt,
                            backoff_ms = state.elapsed_backoff.as_millis(),
                            "turn succeeded after retry"
                        );
                    }
                    return Ok((value, attempt));
                }
                Err(AgentError::Cancelled) => return Err(TurnError::Cancelled),
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "turn failed with non-retryable error");
                    return Err(TurnError::Rejected {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => e,
            };

            warn!(attempt, max_attempts, error = %error, "turn attempt failed");
            state.last_error = Some(error);

            if attempt < max_attempts {
                let delay = self.policy.delay_for(attempt);
                tokio::select! {
                    () = cancel.cancelled() => return Err(TurnError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                state.elapsed_backoff += delay;
            }
        }

        Err(TurnError::Exhausted {
            attempts: state.attempt_number,
            last_reason: state
                .last_error
                .map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
            usage: TokenUsage::default(),
        })
    }
}
