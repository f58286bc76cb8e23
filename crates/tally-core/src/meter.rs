//! The meter contracts application code and publishers program against.
//!
//! Implementations live in `tally-step`; registries and publishers only
//! depend on these traits. Every meter is shared across threads, so the
//! mutation methods take `&self`.

use std::fmt;
use std::time::Duration;

use crate::error::RecordError;
use crate::id::{MeterId, MeterKind};
use crate::time::TimeUnit;

/// What a [`Measurement`] value represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Statistic {
    /// Number of events in the reported step.
    Count,
    /// Sum of recorded amounts in the reported step.
    Total,
    /// Sum of recorded durations in the reported step, in the base unit.
    TotalTime,
    /// Largest single recording in the reported step.
    Max,
    /// Instantaneous value.
    Value,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "count",
            Self::Total => "total",
            Self::TotalTime => "total_time",
            Self::Max => "max",
            Self::Value => "value",
        };
        f.write_str(name)
    }
}

/// One reported number of a meter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    /// Which statistic this is.
    pub statistic: Statistic,
    /// The value for the last completed step (or the current sample for
    /// gauges).
    pub value: f64,
}

impl Measurement {
    /// Pair a statistic with its value.
    pub const fn new(statistic: Statistic, value: f64) -> Self {
        Self { statistic, value }
    }
}

/// Common surface of every registered meter.
pub trait Meter: Send + Sync {
    /// Identity of this meter.
    fn id(&self) -> &MeterId;

    /// Instrument kind.
    fn kind(&self) -> MeterKind;

    /// Read every statistic for the last completed step.
    ///
    /// For step meters this goes through `poll()` and may trigger a
    /// rollover; it never double-counts when called repeatedly.
    fn measure(&self) -> Vec<Measurement>;
}

/// A meter whose values are aggregated per step.
pub trait StepMeter: Meter {
    /// Freeze the in-flight step and disable further rollovers.
    ///
    /// Called once by the registry during an orderly shutdown so the
    /// final partial step is reported instead of dropped. Recordings made
    /// afterwards are accepted but never observed.
    fn closing_rollover(&self);
}

/// Counts events.
pub trait Counter: Meter {
    /// Add `amount` to the count.
    fn increment_by(&self, amount: f64);

    /// Add one to the count.
    fn increment(&self) {
        self.increment_by(1.0);
    }

    /// Count for the last completed step.
    fn count(&self) -> f64;
}

/// Records event latencies.
pub trait Timer: Meter {
    /// Record one event of the given duration.
    fn record(&self, duration: Duration);

    /// Number of events in the last completed step.
    fn count(&self) -> u64;

    /// Sum of latencies in the last completed step.
    fn total_time(&self) -> Duration;

    /// Largest latency in the last completed step.
    fn max(&self) -> Duration;

    /// Mean latency in the last completed step; zero without events.
    fn mean(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_time().as_nanos() / u128::from(count);
            Duration::from_nanos(nanos as u64)
        }
    }
}

/// Records a distribution of amounts (payload sizes, batch sizes, ...).
pub trait DistributionSummary: Meter {
    /// Record one amount. Negative and NaN amounts are rejected.
    fn record(&self, amount: f64) -> Result<(), RecordError>;

    /// Number of recordings in the last completed step.
    fn count(&self) -> u64;

    /// Sum of recorded amounts in the last completed step.
    fn total_amount(&self) -> f64;

    /// Largest amount in the last completed step.
    fn max(&self) -> f64;

    /// Mean amount in the last completed step; zero without recordings.
    fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.total_amount() / count as f64
        }
    }
}

/// A counter fed by a monotonically increasing external function.
pub trait FunctionCounter: Meter {
    /// Increase of the function over the last completed step.
    fn count(&self) -> f64;
}

/// A timer fed by monotonically increasing external count and total
/// functions.
pub trait FunctionTimer: Meter {
    /// Increase of the count function over the last completed step.
    fn count(&self) -> f64;

    /// Increase of the total function over the last completed step,
    /// expressed in `unit`.
    fn total_time(&self, unit: TimeUnit) -> f64;

    /// Mean time per event over the last completed step, in `unit`.
    fn mean(&self, unit: TimeUnit) -> f64 {
        let count = self.count();
        if count == 0.0 {
            0.0
        } else {
            self.total_time(unit) / count
        }
    }
}

/// Samples an instantaneous value.
pub trait Gauge: Meter {
    /// Current value; `NaN` when the sampled object no longer exists.
    fn value(&self) -> f64;
}
