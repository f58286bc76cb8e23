//! Live accumulators written by application threads.
//!
//! The adders spread writes over [`STRIPES`] cache-padded cells, each
//! thread sticking to one cell, so a hot counter does not bounce a single
//! cache line between cores. Reads walk every cell. The max trackers are
//! a single atomic: once the maximum for a step is reached, further
//! recordings are plain loads.
//!
//! Every accumulator is a [`StepSource`]: its `take` reads the value and
//! resets the accumulator in the same pass.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use tally_core::RecordError;

use crate::value::StepSource;

/// Number of cells an adder spreads its writes over.
pub const STRIPES: usize = 16;

static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static STRIPE: usize = NEXT_STRIPE.fetch_add(1, Ordering::Relaxed) % STRIPES;
}

/// Cell index for the calling thread. Falls back to cell 0 while the
/// thread's locals are being torn down.
fn stripe() -> usize {
    STRIPE.try_with(|s| *s).unwrap_or(0)
}

fn cells() -> [CachePadded<AtomicU64>; STRIPES] {
    std::array::from_fn(|_| CachePadded::new(AtomicU64::new(0)))
}

// ── LongAdder ──────────────────────────────────────────────────

/// Striped unsigned integer sum.
///
/// Additions wrap on overflow.
pub struct LongAdder {
    cells: [CachePadded<AtomicU64>; STRIPES],
}

impl LongAdder {
    /// A new adder at zero.
    pub fn new() -> Self {
        Self { cells: cells() }
    }

    /// Add `n`.
    pub fn add(&self, n: u64) {
        self.cells[stripe()].fetch_add(n, Ordering::Relaxed);
    }

    /// Add one.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Current sum. Not a snapshot: concurrent additions may or may not
    /// be included.
    pub fn sum(&self) -> u64 {
        self.cells
            .iter()
            .fold(0u64, |acc, c| acc.wrapping_add(c.load(Ordering::Relaxed)))
    }

    /// Current sum, resetting every cell to zero on the way.
    ///
    /// An addition racing with the reset lands either in the returned sum
    /// or in the next one, never in both.
    pub fn sum_then_reset(&self) -> u64 {
        self.cells
            .iter()
            .fold(0u64, |acc, c| acc.wrapping_add(c.swap(0, Ordering::Relaxed)))
    }
}

impl Default for LongAdder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LongAdder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongAdder").field("sum", &self.sum()).finish()
    }
}

impl StepSource for LongAdder {
    type Value = u64;

    fn take(&self) -> u64 {
        self.sum_then_reset()
    }

    fn no_value(&self) -> u64 {
        0
    }
}

// ── DoubleAdder ────────────────────────────────────────────────

/// Striped floating-point sum. Cells hold `f64` bit patterns.
pub struct DoubleAdder {
    cells: [CachePadded<AtomicU64>; STRIPES],
}

impl DoubleAdder {
    /// A new adder at `0.0`.
    pub fn new() -> Self {
        // 0.0 is the all-zero bit pattern.
        Self { cells: cells() }
    }

    /// Add `x`.
    pub fn add(&self, x: f64) {
        let cell = &self.cells[stripe()];
        let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + x).to_bits())
        });
    }

    /// Current sum. Not a snapshot.
    pub fn sum(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| f64::from_bits(c.load(Ordering::Relaxed)))
            .sum()
    }

    /// Current sum, resetting every cell to `0.0` on the way.
    pub fn sum_then_reset(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| f64::from_bits(c.swap(0, Ordering::Relaxed)))
            .sum()
    }
}

impl Default for DoubleAdder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DoubleAdder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleAdder").field("sum", &self.sum()).finish()
    }
}

impl StepSource for DoubleAdder {
    type Value = f64;

    fn take(&self) -> f64 {
        self.sum_then_reset()
    }

    fn no_value(&self) -> f64 {
        0.0
    }
}

// ── MaxDouble ──────────────────────────────────────────────────

/// Largest non-negative `f64` recorded since the last reset.
pub struct MaxDouble {
    bits: AtomicU64,
}

impl MaxDouble {
    /// A new tracker at `0.0`.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0),
        }
    }

    /// Record `value`.
    ///
    /// # Errors
    ///
    /// Negative values and NaN are rejected and leave the tracked
    /// maximum untouched.
    pub fn record(&self, value: f64) -> Result<(), RecordError> {
        let value = RecordError::check_non_negative(value)?;
        let _ = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (value > f64::from_bits(bits)).then(|| value.to_bits())
            });
        Ok(())
    }

    /// Current maximum.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Current maximum, resetting to `0.0`.
    pub fn get_then_reset(&self) -> f64 {
        f64::from_bits(self.bits.swap(0, Ordering::Relaxed))
    }
}

impl Default for MaxDouble {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MaxDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxDouble").field("max", &self.get()).finish()
    }
}

impl StepSource for MaxDouble {
    type Value = f64;

    fn take(&self) -> f64 {
        self.get_then_reset()
    }

    fn no_value(&self) -> f64 {
        0.0
    }
}

// ── MaxLong ────────────────────────────────────────────────────

/// Largest `u64` recorded since the last reset.
pub struct MaxLong {
    max: AtomicU64,
}

impl MaxLong {
    /// A new tracker at zero.
    pub fn new() -> Self {
        Self {
            max: AtomicU64::new(0),
        }
    }

    /// Record `value`.
    pub fn record(&self, value: u64) {
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Current maximum.
    pub fn get(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Current maximum, resetting to zero.
    pub fn get_then_reset(&self) -> u64 {
        self.max.swap(0, Ordering::Relaxed)
    }
}

impl Default for MaxLong {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MaxLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxLong").field("max", &self.get()).finish()
    }
}

impl StepSource for MaxLong {
    type Value = u64;

    fn take(&self) -> u64 {
        self.get_then_reset()
    }

    fn no_value(&self) -> u64 {
        0
    }
}

// Compile-time assertion: accumulators are shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<LongAdder>();
    assert::<DoubleAdder>();
    assert::<MaxDouble>();
    assert::<MaxLong>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn long_adder_sums_and_resets() {
        let adder = LongAdder::new();
        adder.add(5);
        adder.increment();
        assert_eq!(adder.sum(), 6);
        assert_eq!(adder.sum_then_reset(), 6);
        assert_eq!(adder.sum(), 0);
    }

    #[test]
    fn long_adder_concurrent_adds_are_all_counted() {
        let adder = LongAdder::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        adder.increment();
                    }
                });
            }
        });
        assert_eq!(adder.sum(), 80_000);
    }

    #[test]
    fn concurrent_reset_never_loses_or_duplicates() {
        let adder = LongAdder::new();
        let mut drained = 0u64;
        thread::scope(|s| {
            let writers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..25_000 {
                            adder.add(1);
                        }
                    })
                })
                .collect();
            while writers.iter().any(|w| !w.is_finished()) {
                drained += adder.sum_then_reset();
            }
        });
        drained += adder.sum_then_reset();
        assert_eq!(drained, 100_000);
    }

    #[test]
    fn double_adder_sums_fractions() {
        let adder = DoubleAdder::new();
        adder.add(0.5);
        adder.add(1.25);
        assert_eq!(adder.sum(), 1.75);
        assert_eq!(adder.take(), 1.75);
        assert_eq!(adder.sum(), 0.0);
    }

    #[test]
    fn double_adder_concurrent_adds() {
        let adder = DoubleAdder::new();
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        adder.add(0.5);
                    }
                });
            }
        });
        assert_eq!(adder.sum(), 2_000.0);
    }

    #[test]
    fn max_double_tracks_largest() {
        let max = MaxDouble::new();
        max.record(3.0).unwrap();
        max.record(7.5).unwrap();
        max.record(1.0).unwrap();
        assert_eq!(max.get(), 7.5);
        assert_eq!(max.get_then_reset(), 7.5);
        assert_eq!(max.get(), 0.0);
    }

    #[test]
    fn max_double_rejects_negative_without_touching_max() {
        let max = MaxDouble::new();
        max.record(4.0).unwrap();
        assert_eq!(
            max.record(-1.0),
            Err(RecordError::Negative { value: -1.0 })
        );
        assert_eq!(max.record(f64::NAN), Err(RecordError::NotANumber));
        assert_eq!(max.get(), 4.0);
    }

    #[test]
    fn max_double_treats_negative_zero_as_zero() {
        let max = MaxDouble::new();
        max.record(-0.0).unwrap();
        max.record(2.0).unwrap();
        assert_eq!(max.get(), 2.0);
    }

    #[test]
    fn max_long_concurrent_records() {
        let max = MaxLong::new();
        thread::scope(|s| {
            for t in 0..4u64 {
                let max = &max;
                s.spawn(move || {
                    for i in 0..1_000u64 {
                        max.record(t * 1_000 + i);
                    }
                });
            }
        });
        assert_eq!(max.take(), 3_999);
        assert_eq!(max.get(), 0);
    }

    #[test]
    fn no_values_are_identities() {
        assert_eq!(LongAdder::new().no_value(), 0);
        assert_eq!(DoubleAdder::new().no_value(), 0.0);
        assert_eq!(MaxDouble::new().no_value(), 0.0);
        assert_eq!(MaxLong::new().no_value(), 0);
    }

    // ── proptest ───────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn long_adder_matches_plain_sum(xs in prop::collection::vec(0u64..1_000_000, 0..64)) {
                let adder = LongAdder::new();
                for &x in &xs {
                    adder.add(x);
                }
                prop_assert_eq!(adder.sum_then_reset(), xs.iter().sum::<u64>());
                prop_assert_eq!(adder.sum(), 0);
            }

            #[test]
            fn max_double_matches_fold(xs in prop::collection::vec(0.0f64..1e9, 1..64)) {
                let max = MaxDouble::new();
                for &x in &xs {
                    max.record(x).unwrap();
                }
                let expected = xs.iter().cloned().fold(0.0, f64::max);
                prop_assert_eq!(max.get(), expected);
            }

            #[test]
            fn rejected_values_never_change_max(
                xs in prop::collection::vec(-1e9f64..1e9, 1..64)
            ) {
                let max = MaxDouble::new();
                for &x in &xs {
                    let before = max.get();
                    if max.record(x).is_err() {
                        prop_assert!(x < 0.0);
                        prop_assert_eq!(max.get(), before);
                    }
                }
            }
        }
    }
}
