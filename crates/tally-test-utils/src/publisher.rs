//! A publisher that keeps everything it is given.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tally_core::{MeterSnapshot, PublishError, Publisher, Statistic};

type Hook = Box<dyn Fn() + Send + Sync>;

/// Captures every published batch for later assertions.
///
/// Can be told to fail or panic to exercise the registry's error
/// containment, and can run a hook before each publish to simulate time
/// passing while a publish is in flight.
pub struct RecordingPublisher {
    publishes: AtomicUsize,
    batches: Mutex<Vec<Vec<MeterSnapshot>>>,
    fail: AtomicBool,
    panic: AtomicBool,
    pre_publish: Mutex<Option<Hook>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            publishes: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
            pre_publish: Mutex::new(None),
        }
    }

    /// Return a transport error from every subsequent publish.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Panic inside every subsequent publish.
    pub fn panic_on_publish(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }

    /// Run `hook` at the start of every publish.
    pub fn set_pre_publish(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.pre_publish.lock().unwrap() = Some(Box::new(hook));
    }

    /// Number of `publish` calls, including failed ones.
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Every batch received so far.
    pub fn batches(&self) -> Vec<Vec<MeterSnapshot>> {
        self.batches.lock().unwrap().clone()
    }

    /// All snapshots received so far, flattened across batches.
    pub fn snapshots(&self) -> Vec<MeterSnapshot> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    /// The published values of one statistic of one meter, oldest first.
    pub fn values(&self, name: &str, statistic: Statistic) -> Vec<f64> {
        self.snapshots()
            .iter()
            .filter(|s| s.id.name() == name)
            .filter_map(|s| s.get(statistic))
            .collect()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        self.batches.lock().unwrap().clear();
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    fn publish(&self, batch: &[MeterSnapshot]) -> Result<(), PublishError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.pre_publish.lock().unwrap().as_ref() {
            hook();
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("recording publisher told to panic");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Transport {
                reason: "recording publisher told to fail".into(),
            });
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}
