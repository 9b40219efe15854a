use crate::cache::{CacheStore, Resolution, ResourceKey};
use crate::config::Config;
use crate::fetch::{
    CircuitBreaker, EgressIdentity, EgressPool, FetchError, HttpTransport, RateLimiter,
    RetryError, RetryHandler, RetryPolicy, Transport,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Per-call options for [`FetchController::get`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass the cache, e.g. because the season being fetched is still running
    pub force_refresh: bool,
}

/// Wraps a data source's network access in caching, rate limiting, circuit
/// breaking, retries and egress rotation
///
/// One controller exists per data source; all of its tasks share the same
/// limiter and breaker.
pub struct FetchController {
    name: String,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryHandler,
    egress: EgressPool,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    max_age: Option<Duration>,
}

impl FetchController {
    pub fn new(
        name: impl Into<String>,
        config: &Config,
        egress: EgressPool,
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let name = name.into();
        Self {
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            breaker: CircuitBreaker::from_config(name.clone(), &config.circuit_breaker),
            retry: RetryHandler::new(RetryPolicy::from_config(&config.retry)),
            egress,
            transport,
            cache,
            max_age: config.cache.max_age(),
            name,
        }
    }

    /// Builds a controller speaking HTTP through the configured egress pool
    pub fn from_config(
        name: impl Into<String>,
        config: &Config,
        cache: Arc<CacheStore>,
    ) -> Result<Self, FetchError> {
        let name = name.into();
        let egress = EgressPool::from_config(&config.egress);
        let transport = HttpTransport::new(&egress.proxies(), config.egress.timeout())?;
        debug!("[{}] {} egress identities", name, egress.identities().len());
        Ok(Self::new(name, config, egress, Arc::new(transport), cache))
    }

    /// Stops waiting out retry backoff once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.retry = self.retry.with_cancellation(cancel);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `do_fetch` under the breaker, retry and rate limit policies
    ///
    /// An open breaker fails fast before any attempt is made. Each attempt then
    /// waits for the rate limiter and receives the egress identity selected for
    /// it. Errors are classified with [`FetchError::is_retryable`]; permanent
    /// errors end the call at once, and retryable ones surface as
    /// [`FetchError::RetryExhausted`] once the attempt budget is spent, or as
    /// [`FetchError::Cancelled`] when cancellation interrupts the backoff.
    pub async fn fetch<T, F, Fut>(&self, key: &ResourceKey, mut do_fetch: F) -> Result<T, FetchError>
    where
        F: FnMut(EgressIdentity) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.breaker.try_acquire()?;

        let result = self
            .retry
            .run(
                |attempt| {
                    let identity = self.egress.select(attempt);
                    debug!("[{}] Fetching {} as {}", self.name, key, identity);
                    let call = do_fetch(identity);
                    async move {
                        let waited = self.rate_limiter.acquire().await;
                        if !waited.is_zero() {
                            debug!("[{}] Rate limited for {:?}", self.name, waited);
                        }
                        call.await
                    }
                },
                FetchError::is_retryable,
            )
            .await;

        match result {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(RetryError::NotRetryable(e)) => {
                // The service answered, so it counts as reachable
                if !matches!(e, FetchError::CircuitOpen { .. }) {
                    self.breaker.record_success();
                }
                Err(e)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                self.breaker.record_failure();
                Err(FetchError::RetryExhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            Err(RetryError::Cancelled { attempts, last }) => {
                debug!("[{}] Fetch of {} cancelled", self.name, key);
                Err(FetchError::Cancelled {
                    attempts,
                    last: Box::new(last),
                })
            }
        }
    }

    /// Fetches `url`, serving it from the cache when allowed
    pub async fn get(&self, url: &Url, options: FetchOptions) -> Result<Vec<u8>, FetchError> {
        let key = ResourceKey::from_url(url);

        match self.cache.resolve(&key, self.max_age, options.force_refresh)? {
            Resolution::Hit(entry) => {
                debug!("[{}] Cache hit for {}", self.name, key);
                return Ok(entry.payload);
            }
            Resolution::Miss(reason) => {
                debug!("[{}] Cache miss for {} ({:?})", self.name, key, reason);
            }
        }

        let transport = self.transport.clone();
        let payload = self
            .fetch(&key, |identity| {
                let transport = transport.clone();
                let url = url.clone();
                async move { transport.get(&url, &identity).await }
            })
            .await?;

        if let Err(e) = self.cache.store(&key, &payload) {
            warn!("[{}] Failed to cache {}: {}", self.name, key, e);
        }

        Ok(payload)
    }
}
