//! Tally: step-aggregated application metrics.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Tally sub-crates. For most users, adding `tally` as a single
//! dependency is sufficient.
//!
//! Meters accumulate continuously, but readers only ever see the value of
//! the last *completed* step: a fixed, epoch-aligned window such as one
//! minute. A [`StepMeterRegistry`](registry::StepMeterRegistry) rolls the
//! meters over at every boundary and hands the frozen values to a
//! [`Publisher`](core::Publisher).
//!
//! # Quick start
//!
//! ```rust
//! use std::time::Duration;
//! use tally::prelude::*;
//!
//! let config = StepRegistryConfig {
//!     step: Duration::from_secs(10),
//!     ..StepRegistryConfig::default()
//! };
//! let publisher = LoggingPublisher::new(&config);
//! let registry = StepMeterRegistry::new(config, SystemClock::shared(), publisher).unwrap();
//!
//! let requests = registry.counter(MeterId::new("http.requests").with_tag("method", "GET")).unwrap();
//! requests.increment();
//! let latency = registry.timer("http.latency").unwrap();
//! latency.record(Duration::from_millis(12));
//!
//! // Closing reports the in-flight partial step.
//! registry.close();
//! assert_eq!(requests.count(), 1.0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `tally-core` | Clocks, meter ids, meter traits, publisher hand-off |
//! | [`step`] | `tally-step` | Accumulators, `StepValue`, step meters |
//! | [`registry`] | `tally-registry` | Registry, config, publish thread, logging publisher |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Clocks, meter identity, meter traits and the publisher hand-off
/// (`tally-core`).
pub use tally_core as core;

/// Step-windowed accumulators and meters (`tally-step`).
///
/// [`step::StepValue`] is the rollover primitive; [`step::StepTuple2`]
/// freezes two accumulators together so ratios stay consistent.
pub use tally_step as step;

/// The step meter registry and its configuration (`tally-registry`).
pub use tally_registry as registry;

/// Common imports for typical Tally usage.
///
/// ```rust
/// use tally::prelude::*;
/// ```
pub mod prelude {
    // Clocks
    pub use tally_core::{Clock, SharedClock, SystemClock};

    // Identity
    pub use tally_core::{MeterId, MeterKind, Tag};

    // Meter traits
    pub use tally_core::{
        Counter, DistributionSummary, FunctionCounter, FunctionTimer, Gauge, Meter, StepMeter,
        Timer,
    };

    // Publishing
    pub use tally_core::{Measurement, MeterSnapshot, PublishError, Publisher, Statistic};

    // Errors
    pub use tally_core::RecordError;
    pub use tally_registry::{ConfigError, RegistryError};

    // Units
    pub use tally_core::TimeUnit;

    // Registry
    pub use tally_registry::{LoggingPublisher, StepMeterRegistry, StepRegistryConfig};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;
    use tally_test_utils::{MockClock, RecordingPublisher};

    #[test]
    fn prelude_covers_a_full_cycle() {
        let (clock, shared) = MockClock::shared();
        let publisher = Arc::new(RecordingPublisher::new());
        let registry =
            StepMeterRegistry::new(StepRegistryConfig::default(), shared, Arc::clone(&publisher))
                .unwrap();

        let summary = registry.summary("batch.size").unwrap();
        summary.record(3.0).unwrap();
        summary.record(5.0).unwrap();
        assert_eq!(
            summary.record(-1.0),
            Err(RecordError::Negative { value: -1.0 })
        );

        clock.add_millis(60_000);
        assert_eq!(summary.count(), 2);
        assert_eq!(summary.mean(), 4.0);

        registry.publish();
        assert_eq!(publisher.values("batch.size", Statistic::Total), [8.0]);
    }
}
