//! Tally logging registry: step-aggregated meters published as log lines.
//!
//! Demonstrates:
//!   1. Loading registry config from `TALLY_*`-style properties
//!   2. Recording into counters, timers, summaries and function meters
//!      from several threads
//!   3. Watching one line per meter appear at every step boundary
//!   4. Closing the registry so the partial last step is still reported
//!
//! Run with:
//!   RUST_LOG=info cargo run --example logging_registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tally_core::{Counter, DistributionSummary, MeterId, SystemClock, TimeUnit, Timer};
use tally_registry::{LoggingPublisher, StepMeterRegistry, StepRegistryConfig};
use tracing_subscriber::EnvFilter;

// ─── Workload ───────────────────────────────────────────────────

const WORKERS: usize = 4;
const RUN_FOR: Duration = Duration::from_secs(5);

/// Stand-in for a component that keeps its own totals.
#[derive(Default)]
struct Cache {
    hits: AtomicU64,
    loads: AtomicU64,
    load_nanos: AtomicU64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let props: HashMap<String, String> = [
        ("demo.step", "1s"),
        ("demo.logInactive", "true"),
        ("demo.batchSize", "100"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let mut config = StepRegistryConfig::from_properties("demo", &props)?;
    config.base_time_unit = TimeUnit::Milliseconds;

    let publisher = LoggingPublisher::new(&config);
    let registry = StepMeterRegistry::new(config, SystemClock::shared(), publisher)?;

    let requests = registry.counter(MeterId::new("demo.requests").with_tag("route", "/items"))?;
    let latency = registry.timer("demo.latency")?;
    let payload = registry.summary(MeterId::new("demo.payload").with_base_unit("bytes"))?;

    let cache = Arc::new(Cache::default());
    registry.function_counter("demo.cache.hits", &cache, |c: &Cache| {
        c.hits.load(Ordering::Relaxed) as f64
    })?;
    registry.function_timer(
        "demo.cache.loads",
        &cache,
        |c: &Cache| c.loads.load(Ordering::Relaxed),
        |c: &Cache| c.load_nanos.load(Ordering::Relaxed) as f64,
        TimeUnit::Nanoseconds,
    )?;
    let started = Instant::now();
    registry.gauge("demo.uptime.seconds", &cache, move |_: &Cache| {
        started.elapsed().as_secs_f64()
    })?;

    registry.start()?;

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let (requests, latency, payload, cache) = (&requests, &latency, &payload, &cache);
            s.spawn(move || {
                let mut i = 0u64;
                while started.elapsed() < RUN_FOR {
                    latency.time(|| thread::sleep(Duration::from_millis(2 + (i % 5))));
                    requests.increment();
                    let _ = payload.record((512 * (worker as u64 + 1) + i % 1024) as f64);
                    if i % 3 == 0 {
                        cache.loads.fetch_add(1, Ordering::Relaxed);
                        cache.load_nanos.fetch_add(150_000, Ordering::Relaxed);
                    } else {
                        cache.hits.fetch_add(1, Ordering::Relaxed);
                    }
                    i += 1;
                }
            });
        }
    });

    println!(
        "recorded {} requests, mean latency {:?}",
        requests.partial_count(),
        latency.mean()
    );
    registry.close();
    Ok(())
}
