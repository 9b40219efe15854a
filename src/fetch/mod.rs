//! Resilient fetching
//!
//! This module handles:
//! - Sliding-window rate limiting with a minimum inter-request delay
//! - Circuit breaking against consistently failing sources
//! - Retry with exponential backoff
//! - Rotating egress identities (proxy and user agent)
//! - The reqwest-backed HTTP transport
//!
//! [`FetchController`] composes all of the above with the payload cache.
//! The breaker is consulted before the rate limiter so an open circuit never
//! spends rate budget.

mod circuit_breaker;
mod controller;
mod egress;
mod rate_limiter;
mod retry;
mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use controller::{FetchController, FetchOptions};
pub use egress::{EgressIdentity, EgressPool, RandomPick, RoundRobin, SelectionStrategy};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryError, RetryHandler, RetryPolicy};
pub use transport::{HttpTransport, Transport};

use crate::cache::CacheError;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the fetch layer
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection resets, 429 and 5xx responses
    #[error("Transport error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
        status: Option<u16>,
    },

    /// 4xx responses other than 408/429, malformed URLs, unreadable bodies
    #[error("Permanent fetch error for {url}: {message}")]
    Permanent {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("Circuit '{name}' is open, retry in {retry_after:?}")]
    CircuitOpen { name: String, retry_after: Duration },

    #[error("Giving up after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("Cancelled after {attempts} attempts")]
    Cancelled {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transport { status, .. } | FetchError::Permanent { status, .. } => *status,
            FetchError::RetryExhausted { last, .. } | FetchError::Cancelled { last, .. } => {
                last.status()
            }
            _ => None,
        }
    }

    /// Classifies a non-success HTTP status
    pub fn from_status(url: &str, status: StatusCode) -> Self {
        let message = format!("HTTP {}", status);
        let code = Some(status.as_u16());

        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            FetchError::Transport {
                url: url.to_string(),
                message,
                status: code,
            }
        } else {
            FetchError::Permanent {
                url: url.to_string(),
                message,
                status: code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let url = "https://x.example/";
        for code in [429u16, 408, 500, 502, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(FetchError::from_status(url, status).is_retryable(), "{}", code);
        }
        for code in [400u16, 401, 403, 404, 410] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!FetchError::from_status(url, status).is_retryable(), "{}", code);
        }
    }

    #[test]
    fn test_status_survives_exhaustion() {
        let last = FetchError::from_status("u", StatusCode::SERVICE_UNAVAILABLE);
        let err = FetchError::RetryExhausted {
            attempts: 3,
            last: Box::new(last),
        };
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_chain_includes_last_error() {
        let err = FetchError::RetryExhausted {
            attempts: 3,
            last: Box::new(FetchError::from_status("https://x.example/", StatusCode::BAD_GATEWAY)),
        };
        let text = crate::error_chain(&err);
        assert!(text.starts_with("Giving up after 3 attempts"));
        assert!(text.contains("HTTP 502 Bad Gateway"));
    }
}
