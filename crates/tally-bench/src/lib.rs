//! Benchmark profiles and utilities for the Tally metrics facade.
//!
//! - [`NullPublisher`]: accepts every batch, counting snapshots only
//! - [`populated_registry`]: a registry holding a realistic meter mix
//! - [`register_counters`]: bulk registration for get-or-create costs

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tally_core::{
    Counter, DistributionSummary, MeterId, MeterSnapshot, PublishError, Publisher, SharedClock,
    Timer,
};
use tally_registry::{RegistryError, StepMeterRegistry, StepRegistryConfig};

/// Publisher that drops everything, counting how many snapshots it saw.
#[derive(Debug, Default)]
pub struct NullPublisher {
    seen: AtomicUsize,
}

impl NullPublisher {
    /// Total snapshots received so far.
    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::Relaxed)
    }
}

impl Publisher for NullPublisher {
    fn name(&self) -> &str {
        "null"
    }

    fn publish(&self, batch: &[MeterSnapshot]) -> Result<(), PublishError> {
        self.seen.fetch_add(batch.len(), Ordering::Relaxed);
        Ok(())
    }
}

/// Build a registry with `per_kind` counters, timers and summaries,
/// each tagged with its index and given one recording.
pub fn populated_registry(
    clock: SharedClock,
    publisher: Arc<NullPublisher>,
    per_kind: usize,
) -> Result<StepMeterRegistry, Box<dyn std::error::Error>> {
    let registry = StepMeterRegistry::new(StepRegistryConfig::default(), clock, publisher)?;
    for i in 0..per_kind {
        let index = i.to_string();
        let id = |name: &str| MeterId::new(name).with_tag("index", index.as_str());
        registry.counter(id("bench.requests"))?.increment();
        registry
            .timer(id("bench.latency"))?
            .record(std::time::Duration::from_micros(i as u64 + 1));
        registry.summary(id("bench.payload"))?.record(i as f64)?;
    }
    Ok(registry)
}

/// Register `n` counters under distinct ids, stopping at the first
/// failed registration.
pub fn register_counters(registry: &StepMeterRegistry, n: usize) -> Result<(), RegistryError> {
    for i in 0..n {
        registry.counter(MeterId::new("bench.registered").with_tag("index", i.to_string()))?;
    }
    Ok(())
}
