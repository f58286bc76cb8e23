//! The hand-off between a registry and a backend publisher.
//!
//! A registry polls every meter once per publish cycle and passes the
//! resulting [`MeterSnapshot`]s to a [`Publisher`]. Formatting and
//! transport are entirely the publisher's business.

use std::sync::Arc;

use smallvec::SmallVec;
use thiserror::Error;

use crate::id::{MeterId, MeterKind};
use crate::meter::{Measurement, Meter, Statistic};

/// Polled values of one meter for the last completed step.
#[derive(Clone, Debug, PartialEq)]
pub struct MeterSnapshot {
    /// Meter identity.
    pub id: MeterId,
    /// Instrument kind.
    pub kind: MeterKind,
    /// One entry per reported statistic.
    pub measurements: SmallVec<[Measurement; 4]>,
}

impl MeterSnapshot {
    /// Poll `meter` and capture its measurements.
    pub fn of(meter: &dyn Meter) -> Self {
        Self {
            id: meter.id().clone(),
            kind: meter.kind(),
            measurements: meter.measure().into_iter().collect(),
        }
    }

    /// Value of the given statistic, if this meter reports it.
    pub fn get(&self, statistic: Statistic) -> Option<f64> {
        self.measurements
            .iter()
            .find(|m| m.statistic == statistic)
            .map(|m| m.value)
    }
}

/// Failure reported by a publisher. The registry logs it and carries on;
/// accumulator state is never affected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The backend could not be reached or rejected the request.
    #[error("transport failed: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },
    /// A snapshot could not be encoded in the backend's format.
    #[error("encoding failed: {reason}")]
    Encoding {
        /// Description of the failure.
        reason: String,
    },
}

/// Sends polled meter values to a monitoring backend.
pub trait Publisher: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Send one batch of snapshots. Batches never exceed the registry's
    /// configured batch size.
    fn publish(&self, batch: &[MeterSnapshot]) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn publish(&self, batch: &[MeterSnapshot]) -> Result<(), PublishError> {
        (**self).publish(batch)
    }
}
