//! Paces outgoing requests per upstream target

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Enforces a minimum spacing between calls to the same upstream target
///
/// The slot bookkeeping happens under one lock; the caller sleeps after the
/// lock is released, so concurrent callers queue up one spacing apart without
/// holding each other up on the network call itself.
#[derive(Debug)]
pub struct RateLimiter {
    min_spacing: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Blocks until a call to `target` is allowed, then records it
    ///
    /// Returns how long the caller waited.
    pub fn acquire(&self, target: &str) -> Duration {
        let wait = self.reserve(target, Instant::now());
        if !wait.is_zero() {
            debug!(host = target, wait_ms = wait.as_millis() as u64, "Rate limiting request");
            thread::sleep(wait);
        }
        wait
    }

    /// Claims the next free slot for `target` and returns the delay until it
    fn reserve(&self, target: &str, now: Instant) -> Duration {
        let mut last_call = self.last_call.lock();
        let slot = match last_call.get(target) {
            Some(&last) => {
                let earliest = last + self.min_spacing;
                if earliest > now {
                    earliest
                } else {
                    now
                }
            }
            None => now,
        };
        last_call.insert(target.to_string(), slot);
        slot.saturating_duration_since(now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
