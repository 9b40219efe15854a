use crate::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Outcome of a failed [`RetryHandler::run`]
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error the classifier refused to retry
    #[error("{0}")]
    NotRetryable(E),

    /// Cancellation was requested while waiting to retry
    #[error("cancelled after {attempts} attempts: {last}")]
    Cancelled { attempts: u32, last: E },
}

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            exponential_base: config.exponential_base,
        }
    }

    /// Delay after the failed attempt numbered `attempt` (starting at 0):
    /// `min(initial_delay * exponential_base^attempt, max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs an operation until it succeeds, fails permanently, or runs out of attempts
#[derive(Debug, Clone)]
pub struct RetryHandler {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandons backoff sleeps once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Calls `op` with the attempt number until it succeeds
    ///
    /// Errors for which `should_retry` returns false end the loop immediately.
    /// The handler sleeps [`RetryPolicy::delay_for`] between attempts; a
    /// cancellation during that sleep returns [`RetryError::Cancelled`]
    /// without another attempt.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !should_retry(&e) => return Err(RetryError::NotRetryable(e)),
                Err(e) if attempt + 1 >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: e,
                    })
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:.1}s",
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return Err(RetryError::Cancelled {
                                attempts: attempt + 1,
                                last: e,
                            });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
