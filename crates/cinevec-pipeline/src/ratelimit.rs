//! Token-bucket limiter for the embedding provider's requests-per-minute
//! ceiling.
//!
//! The bucket's decision function takes the current `Instant` explicitly,
//! so tests drive it with a virtual clock; the async wrapper feeds it real
//! time and sleeps out the waits.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Pure token-bucket state. One token per request; refills continuously at
/// the configured per-minute rate up to `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    available: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket that allows `requests_per_minute` sustained, starting full
    /// (an initial burst up to one minute's budget is within the ceiling).
    pub fn per_minute(requests_per_minute: u32, now: Instant) -> Self {
        let capacity = f64::from(requests_per_minute.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            available: capacity,
            last_refill: now,
        }
    }

    /// Try to take one token at `now`. Returns `None` when acquired, or the
    /// duration to wait before a token will be available.
    pub fn poll(&mut self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.available =
            (self.available + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.available >= 1.0 {
            self.available -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.available;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// Shared async wrapper: every embedding request acquires a token before it
/// goes out, enforcing the global requests-per-minute ceiling.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::per_minute(requests_per_minute, Instant::now())),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.poll(Instant::now())
            };
            match wait {
                None => return,
                Some(d) => {
                    debug!(wait_ms = d.as_millis() as u64, "Rate limit reached; waiting");
                    tokio::time::sleep(d).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_up_to_capacity_then_refusal() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::per_minute(6, t0);

        for _ in 0..6 {
            assert_eq!(bucket.poll(t0), None);
        }
        // Drained: the 7th request at the same instant must wait one
        // refill interval (6/min = one token every 10s).
        let wait = bucket.poll(t0).expect("bucket should be empty");
        assert!((wait.as_secs_f64() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_refill_over_virtual_time() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::per_minute(6, t0);
        for _ in 0..6 {
            assert_eq!(bucket.poll(t0), None);
        }

        // 10 virtual seconds later exactly one token has refilled.
        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(bucket.poll(t1), None);
        assert!(bucket.poll(t1).is_some());
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::per_minute(2, t0);

        // After an hour idle the bucket still only holds its capacity.
        let t1 = t0 + Duration::from_secs(3600);
        assert_eq!(bucket.poll(t1), None);
        assert_eq!(bucket.poll(t1), None);
        assert!(bucket.poll(t1).is_some());
    }

    #[test]
    fn test_partial_refill_reports_remaining_wait() {
        let t0 = Instant::now();
        let mut bucket = TokenBucket::per_minute(6, t0);
        for _ in 0..6 {
            assert_eq!(bucket.poll(t0), None);
        }

        // 4s into the 10s refill interval: 6s of wait remain.
        let t1 = t0 + Duration::from_secs(4);
        let wait = bucket.poll(t1).expect("still short of one token");
        assert!((wait.as_secs_f64() - 6.0).abs() < 1e-6);
    }
}
