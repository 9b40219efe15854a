use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Length of the sliding window
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Window {
    /// Start times of requests issued within the last [`WINDOW`]
    recent: VecDeque<Instant>,
    last_request: Option<Instant>,
}

/// Limits request volume to `requests_per_minute` per sliding minute, with at
/// least `min_delay` between consecutive requests
///
/// One instance may be shared by concurrent callers; waiting happens inside a
/// single critical section so callers are admitted one at a time.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: usize,
    min_delay: Duration,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, min_delay: Duration) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1) as usize,
            min_delay,
            window: Mutex::new(Window::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute, config.delay_between_requests())
    }

    /// Waits until a request may be issued, then records it
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut window = self.window.lock().await;
        let started = Instant::now();

        loop {
            let now = Instant::now();
            while window
                .recent
                .front()
                .is_some_and(|t| now.duration_since(*t) >= WINDOW)
            {
                window.recent.pop_front();
            }

            let window_wait = if window.recent.len() >= self.requests_per_minute {
                window
                    .recent
                    .front()
                    .map(|oldest| (*oldest + WINDOW).saturating_duration_since(now))
                    .unwrap_or_default()
            } else {
                Duration::ZERO
            };

            let delay_wait = window
                .last_request
                .map(|last| (last + self.min_delay).saturating_duration_since(now))
                .unwrap_or_default();

            let wait = window_wait.max(delay_wait);
            if wait.is_zero() {
                break;
            }

            debug!("Rate limit: waiting {:?}", wait);
            sleep(wait).await;
        }

        let now = Instant::now();
        window.recent.push_back(now);
        window.last_request = Some(now);

        now.duration_since(started)
    }

    /// Number of requests recorded in the current window
    pub async fn in_window(&self) -> usize {
        let window = self.window.lock().await;
        let now = Instant::now();
        window
            .recent
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(5, Duration::from_secs(3));
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_between_requests() {
        let limiter = RateLimiter::new(100, Duration::from_secs(3));
        let start = Instant::now();

        limiter.acquire().await;
        let waited = limiter.acquire().await;

        assert_eq!(waited, Duration::from_secs(3));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_blocks_extra_request() {
        let limiter = RateLimiter::new(3, Duration::ZERO);
        let start = Instant::now();

        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(limiter.in_window().await, 3);

        let waited = limiter.acquire().await;
        assert_eq!(waited, WINDOW);
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_frees_slots_as_time_passes() {
        let limiter = RateLimiter::new(2, Duration::ZERO);

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.acquire().await;

        // Oldest request leaves the window 30s from now
        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(1)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
