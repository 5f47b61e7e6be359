//! Monotonic time source consumed by [`crate::MessageQueue`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A non-decreasing nanosecond clock.
///
/// `MessageQueue` never reads wall-clock time directly: both `now()` and
/// a message's deadline are measured against the same `Clock`, so a
/// system-clock step can never reorder dispatch.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds, relative to an epoch fixed for the
    /// lifetime of this clock.
    fn now_ns(&self) -> u64;
}

/// Production [`Clock`], backed by [`std::time::Instant`].
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// A [`Clock`] a test can drive by hand: deterministic ordering and
/// timeout assertions without sleeping in real time. `MessageQueue`'s
/// timed wait still sleeps for the real-clock equivalent of a deadline's
/// distance from `now`, so scenarios that need a true wall-clock delay
/// should use small time units (or [`SystemClock`]) rather than this one.
pub struct FakeClock {
    now: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    pub fn set(&self, ns: u64) {
        self.now.store(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, ns: u64) {
        self.now.fetch_add(ns, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
