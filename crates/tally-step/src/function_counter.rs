//! Counter derived from an external monotonic function.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tally_core::{
    FunctionCounter, Measurement, Meter, MeterId, MeterKind, SharedClock, Statistic, StepMeter,
};

use crate::accumulator::DoubleAdder;
use crate::target::Target;
use crate::value::StepDouble;

type CountFn<T> = Box<dyn Fn(&T) -> f64 + Send + Sync>;

/// Samples a monotonically increasing function of `T` and reports how
/// much it grew over each step.
///
/// Every read adds the growth since the previous read to the live step
/// accumulator. A decrease (the external counter was reset) contributes
/// nothing and re-baselines, so the next increase is measured from the
/// lower value. The meter holds `T` weakly; once `T` is dropped no more
/// growth is recorded.
pub struct StepFunctionCounter<T> {
    id: MeterId,
    target: Target<T>,
    f: CountFn<T>,
    /// Last sampled reading, as `f64` bits.
    last: AtomicU64,
    value: StepDouble,
}

impl<T: Send + Sync + 'static> StepFunctionCounter<T> {
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn new<F>(id: MeterId, clock: SharedClock, step_millis: u64, object: &Arc<T>, f: F) -> Self
    where
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        Self {
            id,
            target: Target::new(object),
            f: Box::new(f),
            last: AtomicU64::new(0f64.to_bits()),
            value: StepDouble::new(clock, step_millis, DoubleAdder::new()),
        }
    }

    /// Whether the monitored object has been dropped.
    pub fn is_detached(&self) -> bool {
        self.target.is_detached()
    }

    fn accumulate(&self) {
        let Some(object) = self.target.get(&self.id, MeterKind::FunctionCounter) else {
            return;
        };
        let current = (self.f)(&object);
        if current.is_nan() {
            return;
        }
        let last = f64::from_bits(self.last.swap(current.to_bits(), Ordering::AcqRel));
        let delta = current - last;
        if delta > 0.0 {
            self.value.current().add(delta);
        }
    }
}

impl<T: Send + Sync + 'static> Meter for StepFunctionCounter<T> {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::FunctionCounter
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }
}

impl<T: Send + Sync + 'static> FunctionCounter for StepFunctionCounter<T> {
    fn count(&self) -> f64 {
        self.accumulate();
        self.value.poll()
    }
}

impl<T: Send + Sync + 'static> StepMeter for StepFunctionCounter<T> {
    fn closing_rollover(&self) {
        self.accumulate();
        self.value.closing_rollover();
    }
}

impl<T> fmt::Debug for StepFunctionCounter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFunctionCounter")
            .field("id", &self.id)
            .field("last", &f64::from_bits(self.last.load(Ordering::Relaxed)))
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
