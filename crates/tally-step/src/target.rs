//! Non-owning handle to the object a function meter samples.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tally_core::{MeterId, MeterKind};
use tracing::warn;

/// Holds a [`Weak`] reference so the meter does not keep the monitored
/// object alive. The first failed upgrade is logged once; afterwards the
/// meter reports as detached.
pub(crate) struct Target<T> {
    object: Weak<T>,
    detached: AtomicBool,
}

impl<T> Target<T> {
    pub(crate) fn new(object: &Arc<T>) -> Self {
        Self {
            object: Arc::downgrade(object),
            detached: AtomicBool::new(false),
        }
    }

    /// The monitored object, if it is still alive.
    pub(crate) fn get(&self, id: &MeterId, kind: MeterKind) -> Option<Arc<T>> {
        let object = self.object.upgrade();
        if object.is_none() && !self.detached.swap(true, Ordering::Relaxed) {
            warn!(
                meter = %id,
                kind = %kind,
                "monitored object was dropped; meter stops sampling"
            );
        }
        object
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed) || self.object.strong_count() == 0
    }
}
