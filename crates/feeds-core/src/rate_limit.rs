//! Minimum-interval rate limiting for outbound requests.
//!
//! Each adapter owns one [`RateLimiter`]. Callers [`acquire`](RateLimiter::acquire)
//! a [`RatePermit`] before building a request, which suspends them until at
//! least `min_interval` has passed since the previous dispatched request.
//! The permit holds the limiter's lock, so requests through one limiter are
//! issued one at a time in arrival order.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default minimum interval between requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Enforces a minimum gap between consecutive requests of one adapter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a request may be sent and returns the permit to send it.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let guard = self.last_request.lock().await;

        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limiting: waiting");
                sleep(wait).await;
            }
        }

        RatePermit { guard }
    }

    /// Time of the last dispatched request, if any.
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

/// Exclusive right to dispatch the next request.
///
/// Call [`dispatched`](Self::dispatched) right before sending. Dropping the
/// permit without doing so leaves the limiter's timestamp unchanged.
#[derive(Debug)]
pub struct RatePermit<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
}

impl RatePermit<'_> {
    /// Records that the request is being sent now.
    pub fn dispatched(mut self) {
        *self.guard = Some(Instant::now());
    }
}
