//! The shared logical clock.
//!
//! Every time-sensitive operation reads the current time from one injected
//! [`Clock`]. Consent expiry and emergency override expiry are both compared
//! against it, so the two can never drift apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// A monotonically non-decreasing time source.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in whole seconds since the Unix epoch.
///
/// Readings never go backwards: a host clock step back is clamped to the
/// highest value already handed out.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&self, wall: Timestamp) -> Timestamp {
        let prev = self.last.fetch_max(wall, Ordering::SeqCst);
        prev.max(wall)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.observe(wall)
    }
}

/// A clock that only moves when told to. Used to make tests deterministic.
///
/// The clock never goes backwards: setting an earlier time is ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock to `at` (no-op if `at` is in the past).
    pub fn set(&self, at: Timestamp) {
        self.now.fetch_max(at, Ordering::SeqCst);
    }

    /// Move the clock forward by `delta` units.
    pub fn advance(&self, delta: Timestamp) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(delta))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now(), 15);
        clock.set(40);
        assert_eq!(clock.now(), 40);
    }

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(100);
        clock.set(50);
        assert_eq!(clock.now(), 100);
    }

    #[test]
    fn test_manual_clock_advance_saturates() {
        let clock = ManualClock::new(Timestamp::MAX - 3);
        clock.advance(10);
        assert_eq!(clock.now(), Timestamp::MAX);
        clock.advance(1);
        assert_eq!(clock.now(), Timestamp::MAX);
    }

    #[test]
    fn test_system_clock_is_past_2020() {
        assert!(SystemClock::new().now() > 1_577_836_800);
    }

    #[test]
    fn test_system_clock_clamps_backward_steps() {
        let clock = SystemClock::new();
        assert_eq!(clock.observe(1_000), 1_000);
        assert_eq!(clock.observe(400), 1_000);
        assert_eq!(clock.observe(1_200), 1_200);

        let first = clock.now();
        assert!(first >= 1_200);
        assert!(clock.now() >= first);
    }
}
