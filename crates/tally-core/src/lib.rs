//! Core types and traits for the Tally metrics facade.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! abstractions shared by the step primitives, the registry, and
//! publishers: clocks, meter identity, the meter contracts, time units,
//! and recording errors.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod id;
pub mod meter;
pub mod publish;
pub mod time;

pub use clock::{Clock, SharedClock, SkewableClock, StoppableClock, SystemClock};
pub use error::RecordError;
pub use id::{MeterId, MeterKind, Tag, Tags};
pub use meter::{
    Counter, DistributionSummary, FunctionCounter, FunctionTimer, Gauge, Measurement, Meter,
    Statistic, StepMeter, Timer,
};
pub use publish::{MeterSnapshot, PublishError, Publisher};
pub use time::TimeUnit;
