// Request pacing for remote signal adapters.
//
// Cloud NLP APIs throttle per key. Every HTTP adapter holds a clone of one
// shared limiter so the combined request rate across sentiment, language and
// content-safety calls stays under the configured QPS. A rate of zero or less
// disables pacing entirely.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Minimum-interval pacer shared between adapters.
#[derive(Clone)]
pub struct RateLimiter {
    slot: Option<Arc<Mutex<Pacing>>>,
}

struct Pacing {
    interval: Duration,
    /// Earliest instant the next request may go out
    next_allowed: Option<Instant>,
}

impl RateLimiter {
    /// Allow up to `requests_per_second` requests per second.
    pub fn new(requests_per_second: f64) -> Self {
        if requests_per_second <= 0.0 || !requests_per_second.is_finite() {
            return Self::unlimited();
        }
        Self {
            slot: Some(Arc::new(Mutex::new(Pacing {
                interval: Duration::from_secs_f64(1.0 / requests_per_second),
                next_allowed: None,
            }))),
        }
    }

    pub fn unlimited() -> Self {
        Self { slot: None }
    }

    /// Wait for this caller's turn.
    ///
    /// Each caller reserves the next free slot while holding the lock, then
    /// sleeps outside it, so concurrent callers queue up one interval apart.
    pub async fn acquire(&self) {
        let Some(slot) = &self.slot else {
            return;
        };

        let wait_until = {
            let mut pacing = slot.lock().await;
            let now = Instant::now();
            let start = match pacing.next_allowed {
                Some(at) if at > now => at,
                _ => now,
            };
            pacing.next_allowed = Some(start + pacing.interval);
            start
        };

        tokio::time::sleep_until(wait_until).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_request_waits_one_interval() {
        let limiter = RateLimiter::new(4.0); // 250ms between requests
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(200),
            "Expected ~250ms delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_zero_rate_is_unlimited() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
