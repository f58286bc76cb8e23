//! Background thread driving rollover and publishing once per step.
//!
//! Each step the thread wakes just past the boundary to roll every step
//! meter over, then sleeps until a per-registry publish offset into the
//! step and publishes. The offset is drawn once at spawn so that many
//! processes sharing a step do not all publish at the same instant.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::registry::Shared;

/// Delay past a step boundary before meters are rolled over.
pub(crate) const ROLLOVER_DELAY_MS: u64 = 1;

/// Milliseconds past the step boundary at which to publish, given a
/// uniform random draw `r` in `[0, 1)`.
///
/// Always after [`ROLLOVER_DELAY_MS`], and within the first 80% of the
/// step once the step is long enough.
pub(crate) fn publish_offset(step_millis: u64, r: f64) -> u64 {
    let spread = (step_millis as f64 * r.clamp(0.0, 1.0) * 0.8) as u64;
    ROLLOVER_DELAY_MS + 1 + spread.saturating_sub(ROLLOVER_DELAY_MS + 1)
}

/// First step boundary strictly after `now`.
fn next_boundary(now: u64, step_millis: u64) -> u64 {
    (now / step_millis).saturating_add(1).saturating_mul(step_millis)
}

/// Handle to a running publish thread. Dropping the sender wakes the
/// thread and ends its loop.
pub(crate) struct PublishThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl PublishThread {
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        builder: thread::Builder,
    ) -> Result<Self, RegistryError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let handle = builder
            .spawn(move || run(&shared, &stop_rx))
            .map_err(|e| RegistryError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;
        Ok(Self { stop_tx, handle })
    }

    /// Signal the loop and wait for it. A publish in progress finishes.
    pub(crate) fn stop(self) {
        drop(self.stop_tx);
        if self.handle.join().is_err() {
            warn!("publish thread panicked");
        }
    }
}

fn run(shared: &Shared, stop: &Receiver<()>) {
    let step = shared.config.step_millis();
    let offset = publish_offset(step, rand::random::<f64>());
    debug!(step_ms = step, offset_ms = offset, "publish thread started");

    loop {
        let boundary = next_boundary(shared.wall_time(), step);
        if !sleep_until(shared, stop, boundary.saturating_add(ROLLOVER_DELAY_MS)) {
            break;
        }
        shared.rollover_meters();
        if !sleep_until(shared, stop, boundary.saturating_add(offset)) {
            break;
        }
        shared.publish_safely();
    }
    debug!("publish thread exiting");
}

/// Sleep until wall time reaches `target`. Returns `false` once the
/// thread has been told to stop.
fn sleep_until(shared: &Shared, stop: &Receiver<()>, target: u64) -> bool {
    let wait = target.saturating_sub(shared.wall_time());
    match stop.recv_timeout(Duration::from_millis(wait)) {
        Err(RecvTimeoutError::Timeout) => true,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_rollover() {
        for step in [1, 2, 10, 1_000, 60_000] {
            for r in [0.0, 0.001, 0.5, 0.999_999] {
                assert!(publish_offset(step, r) > ROLLOVER_DELAY_MS, "step {step} r {r}");
            }
        }
    }

    #[test]
    fn offset_stays_in_first_four_fifths() {
        assert_eq!(publish_offset(60_000, 0.0), 2);
        assert_eq!(publish_offset(60_000, 0.5), 24_000);
        assert!(publish_offset(60_000, 0.999_999) < 48_000);
    }

    #[test]
    fn next_boundary_is_strictly_later() {
        assert_eq!(next_boundary(0, 1_000), 1_000);
        assert_eq!(next_boundary(999, 1_000), 1_000);
        assert_eq!(next_boundary(1_000, 1_000), 2_000);
        assert_eq!(next_boundary(u64::MAX, 1_000), u64::MAX);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn offset_never_reaches_next_step_for_long_steps(
                step in 10u64..=86_400_000,
                r in 0.0f64..1.0,
            ) {
                let offset = publish_offset(step, r);
                prop_assert!(offset > ROLLOVER_DELAY_MS);
                prop_assert!(offset < step);
            }
        }
    }
}
