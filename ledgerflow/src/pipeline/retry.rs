//! Retry utilities with configurable backoff and jitter strategies.
//!
//! Only transient failures are retried. With the default configuration a unit
//! of work gets one initial attempt plus three retries, waiting
//! `base * 2^attempt` before retry `attempt` (2s, 4s, 8s).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Total attempts including the initial one.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calculates the delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// The 1-based retry number.
        attempt: u32,
        /// How long to wait first.
        delay: Duration,
    },
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Decides whether to retry after `retries_so_far` retries failed with `error`.
#[must_use]
pub fn should_retry(
    config: &RetryConfig,
    error: &PipelineError,
    retries_so_far: u32,
) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::NotRetryable;
    }
    if retries_so_far >= config.max_retries {
        return RetryDecision::GiveUp;
    }

    let attempt = retries_so_far + 1;
    RetryDecision::Retry {
        attempt,
        delay: config.delay_for(attempt),
    }
}

/// Wraps a unit of work with failure-classified retry.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from a config.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the policy's configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes `operation` until it succeeds, fails non-transiently, exhausts
    /// its retries, or `cancel` fires.
    ///
    /// The operation receives the 1-based attempt number. Cancellation drops an
    /// in-flight attempt and interrupts a pending backoff wait; either way a
    /// [`PipelineError::Cancelled`] is returned instead of another attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut retries = 0;

        loop {
            cancel.error_if_cancelled()?;

            let attempt = retries + 1;
            let Some(outcome) = cancel.run_until_cancelled(operation(attempt)).await else {
                return Err(cancel.to_error());
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match should_retry(&self.config, &error, retries) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!(
                        key = %key,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Retry {} after {:?}", attempt, delay
                    );
                    if !cancel.sleep(delay).await {
                        return Err(cancel.to_error());
                    }
                    retries = attempt;
                }
                RetryDecision::GiveUp => {
                    warn!(
                        key = %key,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(error);
                }
                RetryDecision::NotRetryable => {
                    debug!(key = %key, attempt, error = %error, "Failure is not retryable");
                    return Err(error);
                }
            }
        }
    }
}
