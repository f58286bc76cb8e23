//! Step aggregation for the Tally metrics facade.
//!
//! Continuously updated accumulators are turned into discrete values per
//! fixed, epoch-aligned step. Application threads write into live
//! accumulators without coordination; readers see only the frozen value
//! of the last completed step, rolled over lazily by a single
//! compare-and-set on the step index.
//!
//! The building blocks are layered:
//!
//! - [`accumulator`]: striped adders and max trackers written by the hot
//!   path.
//! - [`StepValue`]: the generic rollover primitive over any
//!   [`StepSource`].
//! - [`StepTuple2`]: two sources frozen by the same rollover.
//! - The meters ([`StepCounter`], [`StepTimer`],
//!   [`StepDistributionSummary`], [`StepFunctionCounter`],
//!   [`StepFunctionTimer`]) and the non-step [`FunctionGauge`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod accumulator;
pub mod counter;
pub mod function_counter;
pub mod function_timer;
pub mod gauge;
pub mod summary;
pub mod timer;
pub mod tuple;
pub mod value;

mod target;

pub use accumulator::{DoubleAdder, LongAdder, MaxDouble, MaxLong};
pub use counter::StepCounter;
pub use function_counter::StepFunctionCounter;
pub use function_timer::StepFunctionTimer;
pub use gauge::FunctionGauge;
pub use summary::StepDistributionSummary;
pub use timer::StepTimer;
pub use tuple::StepTuple2;
pub use value::{StepDouble, StepLong, StepMax, StepSource, StepValue};
