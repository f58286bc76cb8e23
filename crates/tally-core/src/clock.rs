//! Time sources for step arithmetic and elapsed-time measurement.
//!
//! [`Clock::wall_time`] drives step-boundary arithmetic and is the only
//! reading the rollover algorithm consults. [`Clock::monotonic_time`] is
//! used for measuring durations and is never skewed or frozen by the
//! decorators in this module.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of wall-clock and monotonic time.
///
/// Shared read-only across every accumulator of a registry, so
/// implementations must be `Send + Sync`.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn wall_time(&self) -> u64;

    /// Monotonic nanoseconds from an arbitrary fixed origin.
    fn monotonic_time(&self) -> u64;
}

/// A clock shared between a registry and all of its meters.
pub type SharedClock = Arc<dyn Clock>;

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn wall_time(&self) -> u64 {
        (**self).wall_time()
    }

    fn monotonic_time(&self) -> u64 {
        (**self).monotonic_time()
    }
}

// ── SystemClock ──────────────────────────────────────────────────

/// The process clock: `SystemTime` for wall time, `Instant` for
/// monotonic time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// A [`SharedClock`] backed by the system clock.
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn wall_time(&self) -> u64 {
        // A system clock set before 1970 reads as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_time(&self) -> u64 {
        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let origin = ORIGIN.get_or_init(Instant::now);
        Instant::now().duration_since(*origin).as_nanos() as u64
    }
}

// ── SkewableClock ────────────────────────────────────────────────

/// Adds a settable offset to the wrapped clock's wall time.
///
/// Lets tests push a meter across step boundaries without sleeping.
/// Monotonic time passes through unchanged.
#[derive(Debug)]
pub struct SkewableClock<C> {
    inner: C,
    skew_millis: AtomicI64,
}

impl<C: Clock> SkewableClock<C> {
    /// Wrap `inner` with zero skew.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            skew_millis: AtomicI64::new(0),
        }
    }

    /// Replace the current skew. Negative values move wall time backwards.
    pub fn set_skew_millis(&self, skew: i64) {
        self.skew_millis.store(skew, Ordering::Release);
    }

    /// The skew currently applied to wall time.
    pub fn skew_millis(&self) -> i64 {
        self.skew_millis.load(Ordering::Acquire)
    }

    /// The wrapped clock.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Clock> Clock for SkewableClock<C> {
    fn wall_time(&self) -> u64 {
        let base = self.inner.wall_time();
        let skew = self.skew_millis();
        if skew >= 0 {
            base.saturating_add(skew as u64)
        } else {
            base.saturating_sub(skew.unsigned_abs())
        }
    }

    fn monotonic_time(&self) -> u64 {
        self.inner.monotonic_time()
    }
}

// ── StoppableClock ───────────────────────────────────────────────

/// Sentinel meaning "not stopped".
const RUNNING: u64 = u64::MAX;

/// Freezes wall time at an explicit instant until restarted.
///
/// The registry pins its clock with [`stop`](Self::stop) during an
/// orderly shutdown so the closing rollover and the final publish see
/// one consistent instant. Monotonic time keeps running.
#[derive(Debug)]
pub struct StoppableClock<C> {
    inner: C,
    stopped_at: AtomicU64,
}

impl<C: Clock> StoppableClock<C> {
    /// Wrap `inner` in the running state.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            stopped_at: AtomicU64::new(RUNNING),
        }
    }

    /// Freeze wall time at `wall_time_millis`.
    ///
    /// `u64::MAX` is reserved as the running sentinel and is clamped to
    /// `u64::MAX - 1`.
    pub fn stop_at(&self, wall_time_millis: u64) {
        let pinned = wall_time_millis.min(RUNNING - 1);
        self.stopped_at.store(pinned, Ordering::Release);
    }

    /// Freeze wall time at the wrapped clock's current reading.
    /// Returns the pinned instant.
    pub fn stop(&self) -> u64 {
        let now = self.inner.wall_time();
        self.stop_at(now);
        now.min(RUNNING - 1)
    }

    /// Resume following the wrapped clock.
    pub fn restart(&self) {
        self.stopped_at.store(RUNNING, Ordering::Release);
    }

    /// Whether wall time is currently frozen.
    pub fn is_stopped(&self) -> bool {
        self.stopped_at.load(Ordering::Acquire) != RUNNING
    }

    /// The wrapped clock.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Clock> Clock for StoppableClock<C> {
    fn wall_time(&self) -> u64 {
        match self.stopped_at.load(Ordering::Acquire) {
            RUNNING => self.inner.wall_time(),
            pinned => pinned,
        }
    }

    fn monotonic_time(&self) -> u64 {
        self.inner.monotonic_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed clock for exercising the decorators.
    #[derive(Debug)]
    struct Fixed {
        wall: AtomicU64,
        mono: AtomicU64,
    }

    impl Fixed {
        fn new(wall: u64, mono: u64) -> Self {
            Self {
                wall: AtomicU64::new(wall),
                mono: AtomicU64::new(mono),
            }
        }
    }

    impl Clock for Fixed {
        fn wall_time(&self) -> u64 {
            self.wall.load(Ordering::SeqCst)
        }

        fn monotonic_time(&self) -> u64 {
            self.mono.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn system_clock_monotonic_never_decreases() {
        let clock = SystemClock;
        let a = clock.monotonic_time();
        let b = clock.monotonic_time();
        assert!(b >= a);
        assert!(clock.wall_time() > 0);
    }

    #[test]
    fn skew_moves_wall_time_only() {
        let clock = SkewableClock::new(Fixed::new(10_000, 7));
        clock.set_skew_millis(60_000);
        assert_eq!(clock.wall_time(), 70_000);
        assert_eq!(clock.monotonic_time(), 7);

        clock.set_skew_millis(-4_000);
        assert_eq!(clock.wall_time(), 6_000);
        assert_eq!(clock.skew_millis(), -4_000);
    }

    #[test]
    fn negative_skew_saturates_at_zero() {
        let clock = SkewableClock::new(Fixed::new(100, 0));
        clock.set_skew_millis(-1_000);
        assert_eq!(clock.wall_time(), 0);
    }

    #[test]
    fn stopped_clock_pins_wall_time() {
        let clock = StoppableClock::new(Fixed::new(500, 9));
        assert!(!clock.is_stopped());

        clock.stop_at(1_234);
        clock.inner().wall.store(99_999, Ordering::SeqCst);
        clock.inner().mono.store(10, Ordering::SeqCst);
        assert!(clock.is_stopped());
        assert_eq!(clock.wall_time(), 1_234);
        assert_eq!(clock.monotonic_time(), 10);

        clock.restart();
        assert_eq!(clock.wall_time(), 99_999);
    }

    #[test]
    fn stop_pins_current_reading() {
        let clock = StoppableClock::new(Fixed::new(42, 0));
        assert_eq!(clock.stop(), 42);
        clock.inner().wall.store(43, Ordering::SeqCst);
        assert_eq!(clock.wall_time(), 42);
    }

    #[test]
    fn decorators_compose_over_shared_clock() {
        let base: SharedClock = Arc::new(Fixed::new(1_000, 0));
        let skewed = Arc::new(SkewableClock::new(Arc::clone(&base)));
        let stoppable = StoppableClock::new(Arc::clone(&skewed));
        skewed.set_skew_millis(500);
        assert_eq!(stoppable.wall_time(), 1_500);
        stoppable.stop();
        skewed.set_skew_millis(9_000);
        assert_eq!(stoppable.wall_time(), 1_500);
    }
}
