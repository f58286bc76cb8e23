//! Registry error types.

use tally_core::{MeterId, MeterKind};
use thiserror::Error;

/// Errors from registering meters or starting the publish schedule.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id is already registered as a different kind of meter.
    #[error("{id} is registered as a {registered}, not a {requested}")]
    KindMismatch {
        /// The contested id.
        id: MeterId,
        /// Kind already registered under `id`.
        registered: MeterKind,
        /// Kind the caller asked for.
        requested: MeterKind,
    },
    /// The registry has been closed and accepts no new meters.
    #[error("registry is closed")]
    Closed,
    /// The publish thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
}
