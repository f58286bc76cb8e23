//! Step meter registry for the Tally metrics facade.
//!
//! [`StepMeterRegistry`] owns the meters of one application, rolls them
//! over at each step boundary and publishes their last completed step to
//! a [`Publisher`](tally_core::Publisher) on a background thread. On
//! close it flushes the partial step so nothing recorded is lost.
//!
//! ```no_run
//! use tally_core::{Counter, SystemClock};
//! use tally_registry::{LoggingPublisher, StepMeterRegistry, StepRegistryConfig};
//!
//! let config = StepRegistryConfig::default();
//! let publisher = LoggingPublisher::new(&config);
//! let registry = StepMeterRegistry::new(config, SystemClock::shared(), publisher)?;
//! registry.start()?;
//! registry.counter("jobs.done")?.increment();
//! registry.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;

mod publish_thread;

pub use config::{format_duration, parse_duration, ConfigError, PropertySource, StepRegistryConfig};
pub use error::RegistryError;
pub use logging::LoggingPublisher;
pub use registry::StepMeterRegistry;
