//! Test utilities and mock types for Tally development.
//!
//! Provides a hand-driven [`MockClock`] for deterministic step
//! boundaries and a [`RecordingPublisher`] that captures every batch a
//! registry hands it.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod publisher;

pub use publisher::RecordingPublisher;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tally_core::{Clock, SharedClock};

/// A clock that only moves when told to.
///
/// Starts at 1 ms on both the wall and monotonic scales. Advancing the
/// clock moves both scales by the same amount.
#[derive(Debug)]
pub struct MockClock {
    wall_millis: AtomicU64,
    mono_nanos: AtomicU64,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            wall_millis: AtomicU64::new(1),
            mono_nanos: AtomicU64::new(1_000_000),
        }
    }

    /// A new mock clock behind `Arc`, plus the same clock as a
    /// [`SharedClock`] ready to hand to meters and registries.
    pub fn shared() -> (Arc<MockClock>, SharedClock) {
        let clock = Arc::new(MockClock::new());
        let shared: SharedClock = Arc::clone(&clock) as SharedClock;
        (clock, shared)
    }

    /// Advance by `duration`. Returns the new wall time in millis.
    pub fn add(&self, duration: Duration) -> u64 {
        self.mono_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        self.wall_millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst)
            + duration.as_millis() as u64
    }

    /// Advance by `millis` milliseconds. Returns the new wall time.
    pub fn add_millis(&self, millis: u64) -> u64 {
        self.add(Duration::from_millis(millis))
    }

    /// Jump wall time to an absolute value. Monotonic time is untouched.
    pub fn set_wall_time(&self, millis: u64) {
        self.wall_millis.store(millis, Ordering::SeqCst);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn wall_time(&self) -> u64 {
        self.wall_millis.load(Ordering::SeqCst)
    }

    fn monotonic_time(&self) -> u64 {
        self.mono_nanos.load(Ordering::SeqCst)
    }
}
