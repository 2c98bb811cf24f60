//! Cache timing utilities
//!
//! Pure functions plus a clock seam so TTL behaviour can be tested without
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Check whether a snapshot taken at `cached_at` is too old to serve.
///
/// # Arguments
/// * `cached_at` - When the snapshot was taken (None if nothing is cached)
/// * `now` - Current instant
/// * `ttl` - How long a snapshot stays fresh
///
/// # Returns
/// `true` if a re-read is required, `false` while the snapshot is fresh
pub fn ttl_expired(cached_at: Option<Instant>, now: Instant, ttl: Duration) -> bool {
    match cached_at {
        Some(at) => now.saturating_duration_since(at) >= ttl,
        None => true, // Nothing cached yet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[test]
    fn test_ttl_expired_nothing_cached() {
        assert!(ttl_expired(None, Instant::now(), TTL));
        assert!(ttl_expired(None, Instant::now(), Duration::ZERO));
    }

    #[test]
    fn test_ttl_fresh_and_stale() {
        let clock = ManualClock::new();
        let cached_at = clock.now();

        clock.advance(Duration::from_secs(10));
        assert!(!ttl_expired(Some(cached_at), clock.now(), TTL));

        // Exactly at the boundary counts as expired
        clock.advance(Duration::from_secs(20));
        assert!(ttl_expired(Some(cached_at), clock.now(), TTL));
    }

    #[test]
    fn test_ttl_zero_always_expired() {
        let now = Instant::now();
        assert!(ttl_expired(Some(now), now, Duration::ZERO));
    }

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::new();
        let a = clock.now();
        clock.advance(Duration::from_millis(1));
        assert!(clock.now() > a);
    }
}
