//! The step rollover primitive.
//!
//! A [`StepValue`] owns a live accumulator (its [`StepSource`]) and the
//! frozen value of the last completed step. Writers mutate the live
//! accumulator directly through [`StepValue::current`] and never take
//! part in rollover. Readers call [`StepValue::poll`], which first rolls
//! the step over if the clock has crossed a boundary since the last look.
//!
//! Rollover is a single compare-and-set on the step index: whichever
//! caller advances the index drains the live accumulator; every other
//! caller returns without retrying. The drained value becomes the
//! reported value only when exactly one step has elapsed. After a longer
//! gap the steps in between were idle, so the source's `no_value` is
//! reported instead and the drained residue is discarded.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::atomic::AtomicCell;
use crossbeam_utils::Backoff;
use tally_core::SharedClock;

use crate::accumulator::{DoubleAdder, LongAdder, MaxDouble};

/// Step index stored once a value has been closed. No wall time maps to
/// a step beyond it, so rollover can never fire again.
const CLOSED: u64 = u64::MAX;

/// A live accumulator a [`StepValue`] can drain at a step boundary.
pub trait StepSource: Send + Sync {
    /// What one step's worth of accumulation looks like.
    type Value: Copy + Send + fmt::Debug + 'static;

    /// Read the accumulated value and reset the accumulator in one pass.
    fn take(&self) -> Self::Value;

    /// Reported for a step that saw no activity, and before the first
    /// step has elapsed.
    fn no_value(&self) -> Self::Value;
}

/// A value aggregated over fixed, epoch-aligned windows of
/// `step_millis`.
pub struct StepValue<S: StepSource> {
    clock: SharedClock,
    step_millis: u64,
    offset_millis: u64,
    /// Index of the step the live accumulator belongs to.
    last_init_pos: AtomicU64,
    /// Callers between claiming a rollover and storing its result.
    rollers: AtomicUsize,
    previous: AtomicCell<S::Value>,
    current: S,
}

/// Step-windowed integer sum.
pub type StepLong = StepValue<LongAdder>;

/// Step-windowed floating-point sum.
pub type StepDouble = StepValue<DoubleAdder>;

/// Step-windowed maximum.
pub type StepMax = StepValue<MaxDouble>;

impl<S: StepSource> StepValue<S> {
    /// Windows aligned to the Unix epoch.
    ///
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn new(clock: SharedClock, step_millis: u64, source: S) -> Self {
        Self::with_offset(clock, step_millis, 0, source)
    }

    /// Windows shifted forward from the epoch by `offset_millis`.
    ///
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn with_offset(clock: SharedClock, step_millis: u64, offset_millis: u64, source: S) -> Self {
        assert!(step_millis > 0, "step must be at least one millisecond");
        let start = step_index(clock.wall_time(), offset_millis, step_millis);
        Self {
            previous: AtomicCell::new(source.no_value()),
            clock,
            step_millis,
            offset_millis,
            last_init_pos: AtomicU64::new(start),
            rollers: AtomicUsize::new(0),
            current: source,
        }
    }

    /// The live accumulator, for writers.
    pub fn current(&self) -> &S {
        &self.current
    }

    /// Step length in milliseconds.
    pub fn step_millis(&self) -> u64 {
        self.step_millis
    }

    /// Value of the last completed step.
    ///
    /// Repeated polls within one step return the same value.
    pub fn poll(&self) -> S::Value {
        self.roll_count(self.clock.wall_time());
        self.previous.load()
    }

    /// Drain the live accumulator now, regardless of step boundaries.
    ///
    /// The returned value covers whatever was recorded since the last
    /// drain, which may be a fraction of a step. The frozen value and the
    /// step index are left alone, so whatever this takes is missing from
    /// the next completed step.
    ///
    /// Once closed, the live accumulator only holds recordings that are
    /// never reported, so this returns `no_value` and leaves them be.
    pub fn partial_poll(&self) -> S::Value {
        if self.is_closed() {
            return self.current.no_value();
        }
        self.current.take()
    }

    /// Freeze the live accumulator as the final reported value and stop
    /// rolling over.
    ///
    /// Only the first call has an effect. Later recordings still land in
    /// the live accumulator but are never reported.
    ///
    /// A rollover already under way when this is called finishes first,
    /// so the value frozen here is the one that stays.
    pub fn closing_rollover(&self) {
        if self.last_init_pos.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            return;
        }
        let backoff = Backoff::new();
        while self.rollers.load(Ordering::SeqCst) != 0 {
            backoff.snooze();
        }
        self.previous.store(self.current.take());
    }

    /// Whether [`closing_rollover`](Self::closing_rollover) has run.
    pub fn is_closed(&self) -> bool {
        self.last_init_pos.load(Ordering::Acquire) == CLOSED
    }

    fn roll_count(&self, now: u64) {
        let step_time = step_index(now, self.offset_millis, self.step_millis);
        let last_init = self.last_init_pos.load(Ordering::Acquire);
        if last_init >= step_time {
            return;
        }
        // Registered before the claim so a concurrent close can wait for
        // the store below.
        self.rollers.fetch_add(1, Ordering::SeqCst);
        if self
            .last_init_pos
            .compare_exchange(last_init, step_time, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
        {
            let value = self.current.take();
            if last_init == step_time - 1 {
                self.previous.store(value);
            } else {
                self.previous.store(self.current.no_value());
            }
        }
        self.rollers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: StepSource + fmt::Debug> fmt::Debug for StepValue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepValue")
            .field("step_millis", &self.step_millis)
            .field("offset_millis", &self.offset_millis)
            .field("last_init_pos", &self.last_init_pos.load(Ordering::Relaxed))
            .field("previous", &self.previous.load())
            .field("current", &self.current)
            .finish()
    }
}

fn step_index(now: u64, offset_millis: u64, step_millis: u64) -> u64 {
    now.saturating_sub(offset_millis) / step_millis
}
