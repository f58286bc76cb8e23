//! Gauge sampling a function of a weakly held object.

use std::fmt;
use std::sync::Arc;

use tally_core::{Gauge, Measurement, Meter, MeterId, MeterKind, Statistic};

use crate::target::Target;

type ValueFn<T> = Box<dyn Fn(&T) -> f64 + Send + Sync>;

/// Reports the current value of a function of `T` each time it is read.
///
/// Gauges are not step-aggregated: there is nothing to roll over, and a
/// read never changes state. Once `T` is dropped the gauge reads `NaN`.
pub struct FunctionGauge<T> {
    id: MeterId,
    target: Target<T>,
    f: ValueFn<T>,
}

impl<T: Send + Sync + 'static> FunctionGauge<T> {
    /// Gauge reporting `f(object)`.
    pub fn new<F>(id: MeterId, object: &Arc<T>, f: F) -> Self
    where
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        Self {
            id,
            target: Target::new(object),
            f: Box::new(f),
        }
    }

    /// Whether the sampled object has been dropped.
    pub fn is_detached(&self) -> bool {
        self.target.is_detached()
    }
}

impl<T: Send + Sync + 'static> Meter for FunctionGauge<T> {
    fn id(&self) -> &MeterId {
        &self.id
    }

    fn kind(&self) -> MeterKind {
        MeterKind::Gauge
    }

    fn measure(&self) -> Vec<Measurement> {
        vec![Measurement::new(Statistic::Value, self.value())]
    }
}

impl<T: Send + Sync + 'static> Gauge for FunctionGauge<T> {
    fn value(&self) -> f64 {
        self.target
            .get(&self.id, MeterKind::Gauge)
            .map_or(f64::NAN, |object| (self.f)(&object))
    }
}

impl<T> fmt::Debug for FunctionGauge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionGauge")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
