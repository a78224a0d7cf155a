//! Interval-gated logging for sustained failure paths
//!
//! A connection stuck against a rejecting engine would otherwise emit one
//! error line per record. [`RateLimitedLog`] admits one emission per interval
//! and counts what it suppressed in between, so the next admitted log can
//! carry the count. Lock-free: a CAS on elapsed nanos, same scheme as a
//! token bucket refill.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Gate admitting one log emission per interval
pub struct RateLimitedLog {
    interval_nanos: u64,
    start: Instant,
    /// Earliest elapsed-nanos at which the next emission is admitted
    next: AtomicU64,
    suppressed: AtomicU64,
}

impl RateLimitedLog {
    /// Gate with the given minimum interval between emissions
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_nanos: interval.as_nanos() as u64,
            start: Instant::now(),
            next: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Ask to emit
    ///
    /// Returns `Some(suppressed)` when an emission is admitted, carrying the
    /// number of occurrences suppressed since the previous admitted one;
    /// `None` when this occurrence should stay quiet.
    pub fn check(&self) -> Option<u64> {
        let now = self.start.elapsed().as_nanos() as u64;

        loop {
            let next = self.next.load(Ordering::Acquire);
            if now < next {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            if self
                .next
                .compare_exchange_weak(
                    next,
                    now + self.interval_nanos,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Some(self.suppressed.swap(0, Ordering::Relaxed));
            }
        }
    }
}
