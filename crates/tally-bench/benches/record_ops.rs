//! Criterion micro-benchmarks for the recording hot path.

use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use tally_core::{Counter, DistributionSummary, MeterId, TimeUnit, Timer};
use tally_step::{LongAdder, StepCounter, StepDistributionSummary, StepTimer};
use tally_test_utils::MockClock;

const STEP_MS: u64 = 60_000;

/// Benchmark: single-threaded counter increment.
fn bench_counter_increment(c: &mut Criterion) {
    let (_, clock) = MockClock::shared();
    let counter = StepCounter::new(MeterId::new("bench"), clock, STEP_MS);
    c.bench_function("counter_increment", |b| {
        b.iter(|| counter.increment_by(black_box(1.0)));
    });
}

/// Benchmark: timer record, including the max tracker.
fn bench_timer_record(c: &mut Criterion) {
    let (_, clock) = MockClock::shared();
    let timer = StepTimer::new(MeterId::new("bench"), clock, STEP_MS, TimeUnit::Seconds);
    c.bench_function("timer_record", |b| {
        b.iter(|| timer.record(black_box(Duration::from_micros(250))));
    });
}

/// Benchmark: summary record with a scale factor.
fn bench_summary_record(c: &mut Criterion) {
    let (_, clock) = MockClock::shared();
    let summary = StepDistributionSummary::new(MeterId::new("bench"), clock, STEP_MS, 8.0);
    c.bench_function("summary_record", |b| {
        b.iter(|| summary.record(black_box(512.0)));
    });
}

/// Benchmark: four threads hammering one striped adder.
fn bench_contended_adder(c: &mut Criterion) {
    const THREADS: u64 = 4;
    c.bench_function("long_adder_contended_4t", |b| {
        b.iter_custom(|iters| {
            let adder = Arc::new(LongAdder::new());
            let start = Instant::now();
            thread::scope(|s| {
                for _ in 0..THREADS {
                    let adder = Arc::clone(&adder);
                    s.spawn(move || {
                        for _ in 0..iters {
                            adder.increment();
                        }
                    });
                }
            });
            let elapsed = start.elapsed();
            black_box(adder.sum());
            elapsed / THREADS as u32
        });
    });
}

/// Benchmark: reading a counter mid-step, the cost paid on every poll
/// that finds no boundary to cross.
fn bench_poll_without_rollover(c: &mut Criterion) {
    let (_, clock) = MockClock::shared();
    let counter = StepCounter::new(MeterId::new("bench"), clock, STEP_MS);
    counter.increment();
    c.bench_function("counter_poll_same_step", |b| {
        b.iter(|| black_box(counter.count()));
    });
}

criterion_group!(
    benches,
    bench_counter_increment,
    bench_timer_record,
    bench_summary_record,
    bench_contended_adder,
    bench_poll_without_rollover
);
criterion_main!(benches);
