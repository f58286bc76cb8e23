//! The step meter registry: meter map, lifecycle, and publishing.
//!
//! Meters are created on first registration and shared as `Arc`s. A
//! publish takes one snapshot of every meter, which polls step meters
//! and so reports their last completed step, and hands the snapshots to
//! the [`Publisher`] in batches.
//!
//! Lifecycle: **stopped → running → stopped**, then **closed**. While
//! running, a background thread rolls meters over just past each step
//! boundary and publishes a little later in the step. Closing publishes
//! whatever is still unreported, including the in-flight partial step,
//! exactly once.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};
use std::thread;

use indexmap::map::Entry as Slot;
use indexmap::IndexMap;
use tally_core::{
    Clock, FunctionCounter, FunctionTimer, Gauge, Meter, MeterId, MeterKind, MeterSnapshot,
    Publisher, SharedClock, StepMeter, StoppableClock, TimeUnit,
};
use tally_step::{
    FunctionGauge, StepCounter, StepDistributionSummary, StepFunctionCounter, StepFunctionTimer,
    StepTimer,
};
use tracing::{debug, info, warn};

use crate::config::{format_duration, ConfigError, StepRegistryConfig};
use crate::error::RegistryError;
use crate::publish_thread::PublishThread;

/// Wall time stored while no rollover or publish has happened yet.
const NEVER: u64 = u64::MAX;

// ── registered meters ──────────────────────────────────────────────

/// Typed handle kept so get-or-create can return the concrete meter.
#[derive(Clone)]
enum Handle {
    Counter(Arc<StepCounter>),
    Timer(Arc<StepTimer>),
    Summary(Arc<StepDistributionSummary>),
    FunctionCounter(Arc<dyn FunctionCounter>),
    FunctionTimer(Arc<dyn FunctionTimer>),
    Gauge(Arc<dyn Gauge>),
}

struct Entry {
    handle: Handle,
    kind: MeterKind,
    meter: Arc<dyn Meter>,
    /// Set for meters that take part in rollover and closing.
    step: Option<Arc<dyn StepMeter>>,
}

impl Entry {
    fn stepped<M: StepMeter + 'static>(handle: Handle, meter: Arc<M>) -> Self {
        Self {
            handle,
            kind: meter.kind(),
            meter: Arc::clone(&meter) as Arc<dyn Meter>,
            step: Some(meter as Arc<dyn StepMeter>),
        }
    }

    fn plain<M: Meter + 'static>(handle: Handle, meter: Arc<M>) -> Self {
        Self {
            handle,
            kind: meter.kind(),
            meter: meter as Arc<dyn Meter>,
            step: None,
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` against one meter, logging and swallowing a panic so the
/// remaining meters are still served.
fn contained<R>(id: &MeterId, action: &str, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(meter = %id, "meter panicked while {action}; skipped");
            None
        }
    }
}

// ── Shared ─────────────────────────────────────────────────────────

/// State shared between the registry handle and its publish thread.
pub(crate) struct Shared {
    pub(crate) config: StepRegistryConfig,
    clock: Arc<StoppableClock<SharedClock>>,
    meters: RwLock<IndexMap<MeterId, Entry>>,
    publisher: Box<dyn Publisher>,
    /// Held for the duration of a publish.
    publish_lock: Mutex<()>,
    publishing: AtomicBool,
    last_publish_start: AtomicU64,
    last_rollover_start: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn wall_time(&self) -> u64 {
        self.clock.wall_time()
    }

    fn meter_clock(&self) -> SharedClock {
        Arc::clone(&self.clock) as SharedClock
    }

    fn meters(&self) -> Vec<Arc<dyn Meter>> {
        read(&self.meters)
            .values()
            .map(|entry| Arc::clone(&entry.meter))
            .collect()
    }

    fn step_meters(&self) -> Vec<Arc<dyn StepMeter>> {
        read(&self.meters)
            .values()
            .filter_map(|entry| entry.step.clone())
            .collect()
    }

    /// Poll every step meter so any that crossed a boundary roll over now.
    pub(crate) fn rollover_meters(&self) {
        self.last_rollover_start
            .store(self.wall_time(), Ordering::Release);
        for meter in self.step_meters() {
            contained(meter.id(), "rolling over", || meter.measure());
        }
    }

    /// Publish unless a publish is already running.
    pub(crate) fn publish_safely(&self) {
        let _guard = match self.publish_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!("publishing is already in progress; skipping duplicate call to publish");
                return;
            }
        };
        self.publishing.store(true, Ordering::Release);
        self.last_publish_start
            .store(self.wall_time(), Ordering::Release);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.publish_batches()));
        if outcome.is_err() {
            warn!(
                publisher = self.publisher.name(),
                "unexpected panic while publishing metrics"
            );
        }
        self.publishing.store(false, Ordering::Release);
    }

    fn publish_batches(&self) {
        let snapshots: Vec<MeterSnapshot> = self
            .meters()
            .iter()
            .filter_map(|meter| {
                contained(meter.id(), "taking a snapshot", || {
                    MeterSnapshot::of(meter.as_ref())
                })
            })
            .collect();
        for batch in snapshots.chunks(self.config.batch_size) {
            if let Err(error) = self.publisher.publish(batch) {
                warn!(
                    publisher = self.publisher.name(),
                    %error,
                    batch_len = batch.len(),
                    "failed to publish metrics"
                );
            }
        }
    }

    /// Block until an in-flight publish, if any, finishes.
    fn wait_for_publish(&self) {
        drop(lock(&self.publish_lock));
    }

    fn is_publishing(&self) -> bool {
        self.publishing.load(Ordering::Acquire)
    }

    /// Whether a scheduled rollover froze a step that no publish has
    /// reported yet.
    fn should_publish_last_step(&self) -> bool {
        let rolled = self.last_rollover_start.load(Ordering::Acquire);
        if rolled == NEVER {
            return false;
        }
        let step = self.config.step_millis();
        match self.last_publish_start.load(Ordering::Acquire) {
            NEVER => true,
            published => published / step < rolled / step,
        }
    }
}

// ── StepMeterRegistry ──────────────────────────────────────────────

/// Registry of step-aggregated meters that publishes once per step.
///
/// Meter registration and recording work whether or not the publish
/// schedule is running; [`publish`](Self::publish) and
/// [`rollover_meters`](Self::rollover_meters) can also be driven by hand.
pub struct StepMeterRegistry {
    shared: Arc<Shared>,
    schedule: Mutex<Option<PublishThread>>,
}

// Compile-time assertion: registries are shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<StepMeterRegistry>();
};

impl StepMeterRegistry {
    /// Validate `config` and build a stopped registry.
    ///
    /// Meters read time through a [`StoppableClock`] wrapping `clock`,
    /// which the registry pins while closing.
    pub fn new(
        config: StepRegistryConfig,
        clock: SharedClock,
        publisher: impl Publisher + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                clock: Arc::new(StoppableClock::new(clock)),
                meters: RwLock::new(IndexMap::new()),
                publisher: Box::new(publisher),
                publish_lock: Mutex::new(()),
                publishing: AtomicBool::new(false),
                last_publish_start: AtomicU64::new(NEVER),
                last_rollover_start: AtomicU64::new(NEVER),
                closed: AtomicBool::new(false),
            }),
            schedule: Mutex::new(None),
        })
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &StepRegistryConfig {
        &self.shared.config
    }

    /// The clock meters read, as seen through the registry's pin.
    pub fn clock(&self) -> SharedClock {
        self.shared.meter_clock()
    }

    // ── registration ───────────────────────────────────────────────

    fn register<M>(
        &self,
        id: MeterId,
        requested: MeterKind,
        existing: impl Fn(&Handle) -> Option<M>,
        create: impl FnOnce(MeterId, &Shared) -> (M, Entry),
    ) -> Result<M, RegistryError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        let found = |entry: &Entry, id: &MeterId| {
            existing(&entry.handle).ok_or_else(|| RegistryError::KindMismatch {
                id: id.clone(),
                registered: entry.kind,
                requested,
            })
        };

        if let Some(entry) = read(&self.shared.meters).get(&id) {
            return found(entry, &id);
        }
        let mut meters = write(&self.shared.meters);
        match meters.entry(id) {
            Slot::Occupied(slot) => found(slot.get(), slot.key()),
            // Recheck under the write lock: close flips the flag and then
            // takes this lock, so no meter is added after its sweep.
            Slot::Vacant(_) if self.shared.closed.load(Ordering::Acquire) => {
                Err(RegistryError::Closed)
            }
            Slot::Vacant(slot) => {
                let (meter, entry) = create(slot.key().clone(), self.shared.as_ref());
                debug!(meter = %slot.key(), kind = %requested, "registered meter");
                slot.insert(entry);
                Ok(meter)
            }
        }
    }

    /// Get or create the counter registered under `id`.
    pub fn counter(&self, id: impl Into<MeterId>) -> Result<Arc<StepCounter>, RegistryError> {
        self.register(
            id.into(),
            MeterKind::Counter,
            |handle| match handle {
                Handle::Counter(counter) => Some(Arc::clone(counter)),
                _ => None,
            },
            |id, shared| {
                let counter = Arc::new(StepCounter::new(
                    id,
                    shared.meter_clock(),
                    shared.config.step_millis(),
                ));
                let entry = Entry::stepped(Handle::Counter(Arc::clone(&counter)), Arc::clone(&counter));
                (counter, entry)
            },
        )
    }

    /// Get or create the timer registered under `id`. New timers report
    /// in the configured base time unit.
    pub fn timer(&self, id: impl Into<MeterId>) -> Result<Arc<StepTimer>, RegistryError> {
        self.register(
            id.into(),
            MeterKind::Timer,
            |handle| match handle {
                Handle::Timer(timer) => Some(Arc::clone(timer)),
                _ => None,
            },
            |id, shared| {
                let timer = Arc::new(StepTimer::new(
                    id,
                    shared.meter_clock(),
                    shared.config.step_millis(),
                    shared.config.base_time_unit,
                ));
                let entry = Entry::stepped(Handle::Timer(Arc::clone(&timer)), Arc::clone(&timer));
                (timer, entry)
            },
        )
    }

    /// Get or create the distribution summary registered under `id`.
    pub fn summary(
        &self,
        id: impl Into<MeterId>,
    ) -> Result<Arc<StepDistributionSummary>, RegistryError> {
        self.summary_scaled(id, 1.0)
    }

    /// Get or create a distribution summary multiplying every recorded
    /// amount by `scale`. An existing summary keeps its original scale.
    pub fn summary_scaled(
        &self,
        id: impl Into<MeterId>,
        scale: f64,
    ) -> Result<Arc<StepDistributionSummary>, RegistryError> {
        self.register(
            id.into(),
            MeterKind::DistributionSummary,
            |handle| match handle {
                Handle::Summary(summary) => Some(Arc::clone(summary)),
                _ => None,
            },
            |id, shared| {
                let summary = Arc::new(StepDistributionSummary::new(
                    id,
                    shared.meter_clock(),
                    shared.config.step_millis(),
                    scale,
                ));
                let entry =
                    Entry::stepped(Handle::Summary(Arc::clone(&summary)), Arc::clone(&summary));
                (summary, entry)
            },
        )
    }

    /// Get or create a counter reporting the per-step growth of `f`
    /// applied to `object`. The registry holds `object` weakly.
    pub fn function_counter<T, F>(
        &self,
        id: impl Into<MeterId>,
        object: &Arc<T>,
        f: F,
    ) -> Result<Arc<dyn FunctionCounter>, RegistryError>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.register(
            id.into(),
            MeterKind::FunctionCounter,
            |handle| match handle {
                Handle::FunctionCounter(counter) => Some(Arc::clone(counter)),
                _ => None,
            },
            |id, shared| {
                let counter = Arc::new(StepFunctionCounter::new(
                    id,
                    shared.meter_clock(),
                    shared.config.step_millis(),
                    object,
                    f,
                ));
                let handle: Arc<dyn FunctionCounter> = Arc::clone(&counter) as _;
                let entry = Entry::stepped(Handle::FunctionCounter(Arc::clone(&handle)), counter);
                (handle, entry)
            },
        )
    }

    /// Get or create a timer reporting the per-step growth of an
    /// object's own event count and total time. `total_fn` reports in
    /// `total_unit`. The registry holds `object` weakly.
    pub fn function_timer<T, C, F>(
        &self,
        id: impl Into<MeterId>,
        object: &Arc<T>,
        count_fn: C,
        total_fn: F,
        total_unit: TimeUnit,
    ) -> Result<Arc<dyn FunctionTimer>, RegistryError>
    where
        T: Send + Sync + 'static,
        C: Fn(&T) -> u64 + Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.register(
            id.into(),
            MeterKind::FunctionTimer,
            |handle| match handle {
                Handle::FunctionTimer(timer) => Some(Arc::clone(timer)),
                _ => None,
            },
            |id, shared| {
                let timer = Arc::new(StepFunctionTimer::new(
                    id,
                    shared.meter_clock(),
                    shared.config.step_millis(),
                    object,
                    count_fn,
                    total_fn,
                    total_unit,
                    shared.config.base_time_unit,
                ));
                let handle: Arc<dyn FunctionTimer> = Arc::clone(&timer) as _;
                let entry = Entry::stepped(Handle::FunctionTimer(Arc::clone(&handle)), timer);
                (handle, entry)
            },
        )
    }

    /// Get or create a gauge sampling `f` applied to `object`. The
    /// registry holds `object` weakly.
    pub fn gauge<T, F>(
        &self,
        id: impl Into<MeterId>,
        object: &Arc<T>,
        f: F,
    ) -> Result<Arc<dyn Gauge>, RegistryError>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.register(
            id.into(),
            MeterKind::Gauge,
            |handle| match handle {
                Handle::Gauge(gauge) => Some(Arc::clone(gauge)),
                _ => None,
            },
            |id, _| {
                let gauge = Arc::new(FunctionGauge::new(id, object, f));
                let handle: Arc<dyn Gauge> = Arc::clone(&gauge) as _;
                let entry = Entry::plain(Handle::Gauge(Arc::clone(&handle)), gauge);
                (handle, entry)
            },
        )
    }

    /// Deregister the meter under `id`. Its values are no longer
    /// published; holders of the meter can keep recording into it.
    pub fn remove(&self, id: &MeterId) -> Option<Arc<dyn Meter>> {
        write(&self.shared.meters)
            .shift_remove(id)
            .map(|entry| entry.meter)
    }

    /// Every registered meter, in registration order.
    pub fn meters(&self) -> Vec<Arc<dyn Meter>> {
        self.shared.meters()
    }

    /// Number of registered meters.
    pub fn len(&self) -> usize {
        read(&self.shared.meters).len()
    }

    /// Whether no meters are registered.
    pub fn is_empty(&self) -> bool {
        read(&self.shared.meters).is_empty()
    }

    // ── schedule ───────────────────────────────────────────────────

    /// Start publishing on a thread named after the config prefix.
    pub fn start(&self) -> Result<(), RegistryError> {
        let name = format!("{}-step-publisher", self.shared.config.prefix);
        self.start_with(thread::Builder::new().name(name))
    }

    /// Start publishing on a thread built by `builder`.
    ///
    /// A running schedule is stopped first. Does nothing when the config
    /// is disabled.
    pub fn start_with(&self, builder: thread::Builder) -> Result<(), RegistryError> {
        let mut schedule = lock(&self.schedule);
        if let Some(running) = schedule.take() {
            running.stop();
        }
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        if !self.shared.config.enabled {
            info!(
                prefix = %self.shared.config.prefix,
                "metrics publishing is disabled; not starting"
            );
            return Ok(());
        }
        info!(
            publisher = self.shared.publisher.name(),
            "publishing metrics every {}",
            format_duration(self.shared.config.step)
        );
        *schedule = Some(PublishThread::spawn(Arc::clone(&self.shared), builder)?);
        Ok(())
    }

    /// Stop the publish schedule. A publish already under way completes
    /// first.
    pub fn stop(&self) {
        if let Some(running) = lock(&self.schedule).take() {
            running.stop();
            debug!(prefix = %self.shared.config.prefix, "publish schedule stopped");
        }
    }

    /// Whether the publish thread is running.
    pub fn is_running(&self) -> bool {
        lock(&self.schedule).is_some()
    }

    // ── publishing ─────────────────────────────────────────────────

    /// Poll every step meter so those past a step boundary roll over.
    pub fn rollover_meters(&self) {
        self.shared.rollover_meters();
    }

    /// Publish every meter now, or skip with a warning if another
    /// publish is in progress. Publisher errors and panics are logged and
    /// never reach the caller.
    pub fn publish(&self) {
        self.shared.publish_safely();
    }

    /// Whether a publish is in progress.
    pub fn is_publishing(&self) -> bool {
        self.shared.is_publishing()
    }

    /// Wall time the most recent publish started, if any has.
    pub fn last_publish_start(&self) -> Option<u64> {
        match self.shared.last_publish_start.load(Ordering::Acquire) {
            NEVER => None,
            at => Some(at),
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop publishing and report everything not yet reported.
    ///
    /// 1. Stop the schedule.
    /// 2. If a rolled-over step was never published, publish it;
    ///    otherwise wait for any publish in progress.
    /// 3. Pin the clock and freeze the in-flight step of every step
    ///    meter.
    /// 4. Publish the final partial step.
    ///
    /// Only the first call does anything. Disabled registries are closed
    /// without publishing.
    pub fn close(&self) {
        self.stop();
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Wait out any registration that saw the registry open.
        drop(write(&self.shared.meters));
        if !self.shared.config.enabled {
            debug!(prefix = %self.shared.config.prefix, "closed disabled registry");
            return;
        }

        let shared = &self.shared;
        if shared.should_publish_last_step() && !shared.is_publishing() {
            debug!("publishing last completed step before closing");
            shared.publish_safely();
        }
        shared.wait_for_publish();

        let pinned_at = shared.clock.stop();
        for meter in shared.step_meters() {
            contained(meter.id(), "closing", || meter.closing_rollover());
        }
        shared.publish_safely();
        shared.wait_for_publish();
        info!(
            publisher = shared.publisher.name(),
            pinned_at,
            meters = self.len(),
            "registry closed"
        );
    }
}

impl Drop for StepMeterRegistry {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}

impl fmt::Debug for StepMeterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepMeterRegistry")
            .field("config", &self.shared.config)
            .field("publisher", &self.shared.publisher.name())
            .field("meters", &self.len())
            .field("running", &self.is_running())
            .field("closed", &self.is_closed())
            .finish()
    }
}
