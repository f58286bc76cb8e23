//! Step-aggregated timer.

use std::time::Duration;

use tally_core::{
    Measurement, Meter, MeterId, MeterKind, SharedClock, Statistic, StepMeter, TimeUnit, Timer,
};

use crate::accumulator::{LongAdder, MaxLong};
use crate::tuple::StepTuple2;
use crate::value::StepValue;

/// Timer reporting count, total time and max latency per step.
///
/// Latencies are accumulated in nanoseconds. [`Meter::measure`] reports
/// them in the timer's base unit.
#[derive(Debug)]
pub struct StepTimer {
    id: MeterId,
    clock: SharedClock,
    base_unit: TimeUnit,
    totals: StepTuple2<LongAdder, LongAdder>,
    max: StepValue<MaxLong>,
}

impl StepTimer {
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn new(id: MeterId, clock: SharedClock, step_millis: u64, base_unit: TimeUnit) -> Self {
        Self {
            id,
            totals: StepTuple2::new(clock.clone(), step_millis, LongAdder::new(), LongAdder::new()),
            max: StepValue::new(clock.clone(), step_millis, MaxLong::new()),
            clock,
            base_unit,
        }
    }

    /// Unit [`Meter::measure`] reports times in.
    pub fn base_time_unit(&self) -> TimeUnit {
        self.base_unit
    }

    /// Record one event lasting `nanos` nanoseconds.
    pub fn record_nanos(&self, nanos: u64) {
        self.max.current().record(nanos);
        self.totals.first().increment();
        self.totals.second().add(nanos);
    }

    /// Run `f` and record how long it took on the clock's monotonic
    /// scale.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let start = self.clock.monotonic_time();
        let result = f();
        self.record_nanos(self.clock.monotonic_time().saturating_sub(start));
        result
    }

    /// Events since the last drain of the count, draining it.
    pub fn partial_count(&self) -> u64 {
        self.totals.partial_poll1()
    }

    /// Time since the last drain of the total, draining it.
    pub fn partial_total_time(&self) -> Duration {
        Duration::from_nanos(self.totals.partial_poll2())
    }

    /// Mean since the last drain, draining count and total together.
    pub fn partial_mean(&self) -> Duration {
        let (count, nanos) = self.totals.partial_poll();
        mean(count, nanos)
    }
}

fn mean(count: u64, nanos: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(nanos / count)
    }
}

impl Meter for StepTimer {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::Timer
    }

    fn measure(&self) -> Vec<Measurement> {
        let (count, nanos) = self.totals.poll();
        let max = self.max.poll();
        vec![
            Measurement::new(Statistic::Count, count as f64),
            Measurement::new(Statistic::TotalTime, self.base_unit.from_nanos(nanos as f64)),
            Measurement::new(Statistic::Max, self.base_unit.from_nanos(max as f64)),
        ]
    }
}

impl Timer for StepTimer {
    fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.record_nanos(nanos);
    }

    fn count(&self) -> u64 {
        self.totals.poll1()
    }

    fn total_time(&self) -> Duration {
        Duration::from_nanos(self.totals.poll2())
    }

    fn max(&self) -> Duration {
        Duration::from_nanos(self.max.poll())
    }

    fn mean(&self) -> Duration {
        let (count, nanos) = self.totals.poll();
        mean(count, nanos)
    }
}

impl StepMeter for StepTimer {
    fn closing_rollover(&self) {
        self.totals.closing_rollover();
        self.max.closing_rollover();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_test_utils::MockClock;

    const STEP: u64 = 60_000;

    fn timer(unit: TimeUnit) -> (Arc<MockClock>, StepTimer) {
        let (clock, shared) = MockClock::shared();
        let timer = StepTimer::new(MeterId::new("db.query"), shared, STEP, unit);
        (clock, timer)
    }

    #[test]
    fn reports_last_step() {
        let (clock, timer) = timer(TimeUnit::Milliseconds);
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(30));
        clock.add_millis(STEP);

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.total_time(), Duration::from_millis(40));
        assert_eq!(timer.max(), Duration::from_millis(30));
        assert_eq!(timer.mean(), Duration::from_millis(20));
    }

    #[test]
    fn measure_uses_base_unit() {
        let (clock, timer) = timer(TimeUnit::Seconds);
        timer.record(Duration::from_millis(1_500));
        timer.record(Duration::from_millis(500));
        clock.add_millis(STEP);
        assert_eq!(
            timer.measure(),
            vec![
                Measurement::new(Statistic::Count, 2.0),
                Measurement::new(Statistic::TotalTime, 2.0),
                Measurement::new(Statistic::Max, 1.5),
            ]
        );
        assert_eq!(timer.base_time_unit(), TimeUnit::Seconds);
    }

    #[test]
    fn time_uses_monotonic_clock() {
        let (clock, timer) = timer(TimeUnit::Seconds);
        let out = timer.time(|| {
            clock.add(Duration::from_millis(250));
            "done"
        });
        assert_eq!(out, "done");
        // The closure moved wall time too, so the step is still 0.
        assert_eq!(timer.partial_total_time(), Duration::from_millis(250));
    }

    #[test]
    fn idle_step_reports_zero() {
        let (clock, timer) = timer(TimeUnit::Seconds);
        timer.record(Duration::from_secs(1));
        clock.add_millis(STEP);
        assert_eq!(timer.count(), 1);
        clock.add_millis(STEP);
        assert_eq!(timer.count(), 0);
        assert_eq!(timer.max(), Duration::ZERO);
        assert_eq!(timer.mean(), Duration::ZERO);
    }

    #[test]
    fn partial_reads_drain() {
        let (_, timer) = timer(TimeUnit::Seconds);
        timer.record_nanos(100);
        timer.record_nanos(300);
        assert_eq!(timer.partial_mean(), Duration::from_nanos(200));
        timer.record_nanos(50);
        assert_eq!(timer.partial_count(), 1);
        assert_eq!(timer.partial_count(), 0);
    }

    #[test]
    fn closing_rollover_captures_in_flight_step() {
        let (clock, timer) = timer(TimeUnit::Seconds);
        timer.record(Duration::from_secs(2));
        timer.closing_rollover();
        timer.record(Duration::from_secs(9));
        clock.add_millis(2 * STEP);
        assert_eq!(timer.count(), 1);
        assert_eq!(timer.max(), Duration::from_secs(2));
    }
}
