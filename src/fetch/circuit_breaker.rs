use crate::config::CircuitBreakerConfig;
use crate::fetch::FetchError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open,
    /// A single trial call is allowed through
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    /// When the breaker last opened, or when the current trial call was admitted
    since: Instant,
}

/// Fail-fast guard around a dependency that keeps failing
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                since: Instant::now(),
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(name, config.failure_threshold, config.recovery_timeout())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Asks permission to make a call
    ///
    /// Rejects immediately with [`FetchError::CircuitOpen`] while open. Once the
    /// recovery timeout has elapsed exactly one caller is admitted as a half-open
    /// trial call; a trial call that never reports back is replaced after another timeout.
    pub fn try_acquire(&self) -> Result<(), FetchError> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open | CircuitState::HalfOpen => {
                let elapsed = now.duration_since(inner.since);
                if elapsed >= self.recovery_timeout {
                    if inner.state == CircuitState::Open {
                        info!("Circuit '{}' half-open, admitting trial call", self.name);
                    }
                    inner.state = CircuitState::HalfOpen;
                    inner.since = now;
                    Ok(())
                } else {
                    Err(FetchError::CircuitOpen {
                        name: self.name.clone(),
                        retry_after: self.recovery_timeout - elapsed,
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!("Circuit '{}' closed", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::HalfOpen => {
                warn!("Circuit '{}' trial call failed, reopening", self.name);
                inner.state = CircuitState::Open;
                inner.since = now;
            }
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                warn!(
                    "Circuit '{}' opened after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
                inner.state = CircuitState::Open;
                inner.since = now;
            }
            _ => {}
        }
    }
}
