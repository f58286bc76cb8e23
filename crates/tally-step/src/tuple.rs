//! Two step values that always roll over together.

use std::fmt;

use tally_core::SharedClock;

use crate::value::{StepSource, StepValue};

/// A pair of sources drains both halves in one `take`, so a pair can sit
/// behind a single step index.
impl<A: StepSource, B: StepSource> StepSource for (A, B) {
    type Value = (A::Value, B::Value);

    fn take(&self) -> Self::Value {
        (self.0.take(), self.1.take())
    }

    fn no_value(&self) -> Self::Value {
        (self.0.no_value(), self.1.no_value())
    }
}

/// Two correlated accumulators sharing one step index.
///
/// Both halves are frozen by the same rollover, so a statistic derived
/// from both (a mean from a count and a total) never mixes two windows.
pub struct StepTuple2<A: StepSource, B: StepSource> {
    inner: StepValue<(A, B)>,
}

impl<A: StepSource, B: StepSource> StepTuple2<A, B> {
    /// Windows aligned to the Unix epoch.
    ///
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn new(clock: SharedClock, step_millis: u64, first: A, second: B) -> Self {
        Self {
            inner: StepValue::new(clock, step_millis, (first, second)),
        }
    }

    /// Windows shifted from the epoch by `offset_millis`.
    ///
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn with_offset(
        clock: SharedClock,
        step_millis: u64,
        offset_millis: u64,
        first: A,
        second: B,
    ) -> Self {
        Self {
            inner: StepValue::with_offset(clock, step_millis, offset_millis, (first, second)),
        }
    }

    /// Live accumulator of the first half.
    pub fn first(&self) -> &A {
        &self.inner.current().0
    }

    /// Live accumulator of the second half.
    pub fn second(&self) -> &B {
        &self.inner.current().1
    }

    /// Both halves of the last completed step.
    pub fn poll(&self) -> (A::Value, B::Value) {
        self.inner.poll()
    }

    /// First half of the last completed step.
    pub fn poll1(&self) -> A::Value {
        self.poll().0
    }

    /// Second half of the last completed step.
    pub fn poll2(&self) -> B::Value {
        self.poll().1
    }

    /// Drain both live halves now. See [`StepValue::partial_poll`].
    pub fn partial_poll(&self) -> (A::Value, B::Value) {
        self.inner.partial_poll()
    }

    /// Drain only the first live half. `no_value` once closed.
    pub fn partial_poll1(&self) -> A::Value {
        if self.is_closed() {
            return self.first().no_value();
        }
        self.first().take()
    }

    /// Drain only the second live half. `no_value` once closed.
    pub fn partial_poll2(&self) -> B::Value {
        if self.is_closed() {
            return self.second().no_value();
        }
        self.second().take()
    }

    /// Freeze both halves and stop rolling over.
    pub fn closing_rollover(&self) {
        self.inner.closing_rollover();
    }

    /// Whether [`closing_rollover`](Self::closing_rollover) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Step length in milliseconds.
    pub fn step_millis(&self) -> u64 {
        self.inner.step_millis()
    }
}

impl<A, B> fmt::Debug for StepTuple2<A, B>
where
    A: StepSource + fmt::Debug,
    B: StepSource + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StepTuple2").field(&self.inner).finish()
    }
}
