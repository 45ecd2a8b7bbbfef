use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::ResilienceConfig;
use crate::error::ResilienceError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket refilled continuously from elapsed wall time.
///
/// A full window's worth of elapsed time restores the full bucket; shorter
/// gaps restore proportionally. `acquire` never blocks.
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: f64,
    window: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_tokens: f64::from(max_requests),
            window,
            state: Mutex::new(BucketState {
                tokens: f64::from(max_requests),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Take `n` tokens if available. Returns false without waiting otherwise.
    pub fn acquire(&self, n: u32) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.refill(&mut state);
        let needed = f64::from(n);
        if state.tokens >= needed {
            state.tokens -= needed;
            true
        } else {
            debug!(
                requested = n,
                available = state.tokens,
                "rate limit: insufficient tokens"
            );
            false
        }
    }

    /// Whole tokens currently available, after refill.
    pub fn available(&self) -> u32 {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens.floor() as u32
    }

    /// Poll until `n` tokens are acquired or `timeout` elapses.
    pub async fn wait_for(&self, n: u32, timeout: Duration) -> Result<(), ResilienceError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.acquire(n) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ResilienceError::RateLimited(n));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        if elapsed.is_zero() {
            return;
        }
        let regained =
            elapsed.as_secs_f64() / self.window.as_secs_f64() * self.max_tokens;
        state.tokens = (state.tokens + regained).min(self.max_tokens);
        state.last_refill = Instant::now();
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            max_tokens: self.max_tokens,
            window: self.window,
            state: Mutex::new(*state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_to_zero_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.acquire(2));
        assert!(limiter.acquire(1));
        assert!(!limiter.acquire(1));
    }

    #[test]
    fn refills_proportionally_over_time() {
        let limiter = RateLimiter::new(100, Duration::from_millis(100));
        assert!(limiter.acquire(100));
        assert!(!limiter.acquire(1));

        std::thread::sleep(Duration::from_millis(30));
        let available = limiter.available();
        assert!(available >= 10, "expected partial refill, got {available}");
        assert!(limiter.acquire(10));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(limiter.available(), 5);
    }

    #[tokio::test]
    async fn wait_for_times_out_when_starved() {
        let limiter = RateLimiter::new(1, Duration::from_secs(3600));
        assert!(limiter.acquire(1));
        let err = limiter
            .wait_for(1, Duration::from_millis(50))
            .await
            .expect_err("should time out");
        assert!(matches!(err, ResilienceError::RateLimited(1)));
    }

    #[tokio::test]
    async fn wait_for_succeeds_once_tokens_return() {
        let limiter = RateLimiter::new(10, Duration::from_millis(200));
        assert!(limiter.acquire(10));
        limiter
            .wait_for(2, Duration::from_secs(2))
            .await
            .expect("tokens should refill within the deadline");
    }
}
