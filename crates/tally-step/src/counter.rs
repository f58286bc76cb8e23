//! Step-aggregated counter.

use tally_core::{
    Counter, Measurement, Meter, MeterId, MeterKind, SharedClock, Statistic, StepMeter,
};

use crate::accumulator::DoubleAdder;
use crate::value::StepDouble;

/// Counter reporting the increments of the last completed step.
#[derive(Debug)]
pub struct StepCounter {
    id: MeterId,
    value: StepDouble,
}

impl StepCounter {
    /// # Panics
    ///
    /// Panics if `step_millis` is zero.
    pub fn new(id: MeterId, clock: SharedClock, step_millis: u64) -> Self {
        Self {
            id,
            value: StepDouble::new(clock, step_millis, DoubleAdder::new()),
        }
    }

    /// Increments since the last drain, draining them.
    pub fn partial_count(&self) -> f64 {
        self.value.partial_poll()
    }
}

impl Meter for StepCounter {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::Counter
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Count, self.count())]
    }
}

impl Counter for StepCounter {
    fn increment_by(&self, amount: f64) {
        self.value.current().add(amount);
    }

    fn count(&self) -> f64 {
        self.value.poll()
    }
}

impl StepMeter for StepCounter {
    fn closing_rollover(&self) {
        self.value.closing_rollover();
    }
}
