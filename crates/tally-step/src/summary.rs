//! Step-aggregated distribution summary.

use tally_core::{
    DistributionSummary, Measurement, Meter, MeterId, MeterKind, RecordError, SharedClock,
    Statistic, StepMeter,
};

use crate::accumulator::{DoubleAdder, LongAdder, MaxDouble};
use crate::tuple::StepTuple2;
use crate::value::StepMax;

/// Distribution summary reporting count, total and max per step.
///
/// Every recorded amount is multiplied by a fixed `scale` first, which
/// lets callers record in one unit and report in another.
#[derive(Debug)]
pub struct StepDistributionSummary {
    id: MeterId,
    scale: f64,
    totals: StepTuple2<LongAdder, DoubleAdder>,
    max: StepMax,
}

impl StepDistributionSummary {
    /// `scale` should be a positive, finite factor; use `1.0` for none.
    ///
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn new(id: MeterId, clock: SharedClock, step_millis: u64, scale: f64) -> Self {
        Self {
            id,
            scale,
            totals: StepTuple2::new(clock.clone(), step_millis, LongAdder::new(), DoubleAdder::new()),
            max: StepMax::new(clock, step_millis, MaxDouble::new()),
        }
    }

    /// Factor applied to every recorded amount.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Recordings since the last drain of the count, draining it.
    pub fn partial_count(&self) -> u64 {
        self.totals.partial_poll1()
    }

    /// Sum since the last drain of the total, draining it.
    pub fn partial_total_amount(&self) -> f64 {
        self.totals.partial_poll2()
    }

    /// Mean since the last drain, draining count and total together.
    pub fn partial_mean(&self) -> f64 {
        let (count, total) = self.totals.partial_poll();
        mean(count, total)
    }
}

fn mean(count: u64, total: f64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

impl Meter for StepDistributionSummary {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::DistributionSummary
    }

    fn measure(&self) -> Vec<Measurement> {
        let (count, total) = self.totals.poll();
        vec![
            Measurement::new(Statistic::Count, count as f64),
            Measurement::new(Statistic::Total, total),
            Measurement::new(Statistic::Max, self.max.poll()),
        ]
    }
}

impl DistributionSummary for StepDistributionSummary {
    fn record(&self, amount: f64) -> Result<(), RecordError> {
        let amount = RecordError::check_non_negative(amount)? * self.scale;
        // The max check also catches a bad scale; nothing is recorded
        // unless it passes.
        self.max.current().record(amount)?;
        self.totals.first().increment();
        self.totals.second().add(amount);
        Ok(())
    }

    fn count(&self) -> u64 {
        self.totals.poll1()
    }

    fn total_amount(&self) -> f64 {
        self.totals.poll2()
    }

    fn max(&self) -> f64 {
        self.max.poll()
    }

    fn mean(&self) -> f64 {
        let (count, total) = self.totals.poll();
        mean(count, total)
    }
}

impl StepMeter for StepDistributionSummary {
    fn closing_rollover(&self) {
        self.totals.closing_rollover();
        self.max.closing_rollover();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_test_utils::MockClock;

    const STEP: u64 = 60_000;

    fn summary(scale: f64) -> (std::sync::Arc<MockClock>, StepDistributionSummary) {
        let (clock, shared) = MockClock::shared();
        let summary = StepDistributionSummary::new(MeterId::new("payload"), shared, STEP, scale);
        (clock, summary)
    }

    #[test]
    fn reports_count_total_max_per_step() {
        let (clock, summary) = summary(1.0);
        summary.record(10.0).unwrap();
        summary.record(30.0).unwrap();
        clock.add_millis(STEP);

        assert_eq!(summary.count(), 2);
        assert_eq!(summary.total_amount(), 40.0);
        assert_eq!(summary.max(), 30.0);
        assert_eq!(summary.mean(), 20.0);
        assert_eq!(
            summary.measure(),
            vec![
                Measurement::new(Statistic::Count, 2.0),
                Measurement::new(Statistic::Total, 40.0),
                Measurement::new(Statistic::Max, 30.0),
            ]
        );
    }

    #[test]
    fn negative_amount_is_rejected_and_not_recorded() {
        let (clock, summary) = summary(1.0);
        summary.record(5.0).unwrap();
        assert_eq!(
            summary.record(-2.0),
            Err(RecordError::Negative { value: -2.0 })
        );
        assert_eq!(summary.record(f64::NAN), Err(RecordError::NotANumber));
        clock.add_millis(STEP);
        assert_eq!(summary.count(), 1);
        assert_eq!(summary.total_amount(), 5.0);
        assert_eq!(summary.max(), 5.0);
    }

    #[test]
    fn scale_applies_to_every_statistic() {
        let (clock, summary) = summary(1_000.0);
        summary.record(0.5).unwrap();
        clock.add_millis(STEP);
        assert_eq!(summary.total_amount(), 500.0);
        assert_eq!(summary.max(), 500.0);
        assert_eq!(summary.scale(), 1_000.0);
    }

    #[test]
    fn partial_reads() {
        let (_, summary) = summary(1.0);
        summary.record(2.0).unwrap();
        summary.record(4.0).unwrap();
        assert_eq!(summary.partial_mean(), 3.0);
        summary.record(8.0).unwrap();
        assert_eq!(summary.partial_count(), 1);
        assert_eq!(summary.partial_total_amount(), 8.0);
        assert_eq!(summary.partial_mean(), 0.0);
    }

    #[test]
    fn closing_rollover_freezes_everything() {
        let (clock, summary) = summary(1.0);
        summary.record(3.0).unwrap();
        summary.closing_rollover();
        summary.record(99.0).unwrap();
        clock.add_millis(3 * STEP);
        assert_eq!(summary.count(), 1);
        assert_eq!(summary.max(), 3.0);
    }

    #[test]
    fn mean_is_zero_without_recordings() {
        let (clock, summary) = summary(1.0);
        clock.add_millis(STEP);
        assert_eq!(summary.mean(), 0.0);
    }
}
