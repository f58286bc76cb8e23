//! Timer derived from external monotonic count and total functions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tally_core::{
    FunctionTimer, Measurement, Meter, MeterId, MeterKind, SharedClock, Statistic, StepMeter,
    TimeUnit,
};

use crate::accumulator::{DoubleAdder, LongAdder};
use crate::target::Target;
use crate::tuple::StepTuple2;

type CountFn<T> = Box<dyn Fn(&T) -> u64 + Send + Sync>;
type TotalFn<T> = Box<dyn Fn(&T) -> f64 + Send + Sync>;

/// Samples an object that keeps its own running event count and total
/// time (a connection pool, an executor) and reports the growth of both
/// over each step.
///
/// Count and total growth go into one [`StepTuple2`], so the reported
/// mean always divides figures from the same step. Decreases are clamped
/// to zero and re-baseline, as for
/// [`StepFunctionCounter`](crate::StepFunctionCounter).
pub struct StepFunctionTimer<T> {
    id: MeterId,
    target: Target<T>,
    count_fn: CountFn<T>,
    total_fn: TotalFn<T>,
    total_unit: TimeUnit,
    base_unit: TimeUnit,
    last_count: AtomicU64,
    /// Last total reading in `total_unit`, as `f64` bits.
    last_total: AtomicU64,
    totals: StepTuple2<LongAdder, DoubleAdder>,
}

impl<T: Send + Sync + 'static> StepFunctionTimer<T> {
    /// `total_fn` reports in `total_unit`; [`Meter::measure`] reports
    /// total time in `base_unit`.
    ///
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new<C, F>(
        id: MeterId,
        clock: SharedClock,
        step_millis: u64,
        object: &Arc<T>,
        count_fn: C,
        total_fn: F,
        total_unit: TimeUnit,
        base_unit: TimeUnit,
    ) -> Self
    where
        C: Fn(&T) -> u64 + Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        Self {
            id,
            target: Target::new(object),
            count_fn: Box::new(count_fn),
            total_fn: Box::new(total_fn),
            total_unit,
            base_unit,
            last_count: AtomicU64::new(0),
            last_total: AtomicU64::new(0f64.to_bits()),
            totals: StepTuple2::new(clock, step_millis, LongAdder::new(), DoubleAdder::new()),
        }
    }

    /// Whether the monitored object has been dropped.
    pub fn is_detached(&self) -> bool {
        self.target.is_detached()
    }

    /// Unit [`Meter::measure`] reports total time in.
    pub fn base_time_unit(&self) -> TimeUnit {
        self.base_unit
    }

    fn accumulate(&self) {
        let Some(object) = self.target.get(&self.id, MeterKind::FunctionTimer) else {
            return;
        };
        let count = (self.count_fn)(&object);
        let last_count = self.last_count.swap(count, Ordering::AcqRel);
        self.totals.first().add(count.saturating_sub(last_count));

        let total = (self.total_fn)(&object);
        if total.is_nan() {
            return;
        }
        let last_total = f64::from_bits(self.last_total.swap(total.to_bits(), Ordering::AcqRel));
        let delta = total - last_total;
        if delta > 0.0 {
            self.totals.second().add(delta);
        }
    }

    fn poll(&self) -> (u64, f64) {
        self.accumulate();
        self.totals.poll()
    }
}

impl<T: Send + Sync + 'static> Meter for StepFunctionTimer<T> {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::FunctionTimer
    }

    fn measure(&self) -> Vec<Measurement> {
        let (count, total) = self.poll();
        vec![
            Measurement::new(Statistic::Count, count as f64),
            Measurement::new(
                Statistic::TotalTime,
                self.total_unit.convert(total, self.base_unit),
            ),
        ]
    }
}

impl<T: Send + Sync + 'static> FunctionTimer for StepFunctionTimer<T> {
    fn count(&self) -> f64 {
        self.poll().0 as f64
    }

    fn total_time(&self, unit: TimeUnit) -> f64 {
        self.total_unit.convert(self.poll().1, unit)
    }

    fn mean(&self, unit: TimeUnit) -> f64 {
        let (count, total) = self.poll();
        if count == 0 {
            0.0
        } else {
            self.total_unit.convert(total, unit) / count as f64
        }
    }
}

impl<T: Send + Sync + 'static> StepMeter for StepFunctionTimer<T> {
    fn closing_rollover(&self) {
        self.accumulate();
        self.totals.closing_rollover();
    }
}

impl<T> fmt::Debug for StepFunctionTimer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFunctionTimer")
            .field("id", &self.id)
            .field("total_unit", &self.total_unit)
            .field("base_unit", &self.base_unit)
            .field("totals", &self.totals)
            .finish_non_exhaustive()
    }
}
