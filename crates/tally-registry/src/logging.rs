//! A publisher that writes one human-readable line per meter.
//!
//! Lines look like
//!
//! ```text
//! http.requests{method=GET} delta_count=42 throughput=0.7/s
//! http.latency delta_count=42 throughput=0.7/s mean=12.5ms max=80ms
//! queue.depth value=7
//! ```
//!
//! Meters are written sorted by kind, then by name. Counters, timers and
//! summaries that saw nothing during the step are skipped unless
//! `log_inactive` is set. Rates are per second of the configured step.
//! Meters whose base unit is `bytes` render amounts as `KiB`, `MiB`, and
//! so on.

use std::fmt;
use std::time::Duration;

use tally_core::{MeterKind, MeterSnapshot, PublishError, Publisher, Statistic, TimeUnit};

use crate::config::StepRegistryConfig;

/// Destination of rendered lines.
type Sink = Box<dyn Fn(&str) + Send + Sync>;

/// Writes every meter as a log line through `tracing`, or through a
/// custom sink.
pub struct LoggingPublisher {
    step: Duration,
    base_time_unit: TimeUnit,
    log_inactive: bool,
    sink: Sink,
}

impl LoggingPublisher {
    /// Log lines at `INFO` under the `tally::logging` target.
    pub fn new(config: &StepRegistryConfig) -> Self {
        Self::with_sink(config, |line| {
            tracing::info!(target: "tally::logging", "{line}");
        })
    }

    /// Hand every line to `sink` instead of `tracing`.
    pub fn with_sink(
        config: &StepRegistryConfig,
        sink: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            step: config.step,
            base_time_unit: config.base_time_unit,
            log_inactive: config.log_inactive,
            sink: Box::new(sink),
        }
    }

    /// Render the line for one meter, or `None` if it is inactive and
    /// inactive meters are not logged.
    pub fn line(&self, snapshot: &MeterSnapshot) -> Option<String> {
        let print = Printer {
            publisher: self,
            snapshot,
        };
        let id = &snapshot.id;
        let count = print.get(Statistic::Count);
        if count == 0.0 && !self.log_inactive && snapshot.kind != MeterKind::Gauge {
            return None;
        }

        let line = match snapshot.kind {
            MeterKind::Gauge => format!("{id} value={}", print.value(print.get(Statistic::Value))),
            MeterKind::Counter | MeterKind::FunctionCounter => format!(
                "{id} delta_count={} throughput={}",
                print.value(count),
                print.rate(count)
            ),
            MeterKind::Timer => format!(
                "{id} delta_count={} throughput={} mean={} max={}",
                whole_or_decimal(count),
                print.unitless_rate(count),
                print.time(mean(print.get(Statistic::TotalTime), count)),
                print.time(print.get(Statistic::Max)),
            ),
            MeterKind::DistributionSummary => format!(
                "{id} delta_count={} throughput={} mean={} max={}",
                whole_or_decimal(count),
                print.unitless_rate(count),
                print.value(mean(print.get(Statistic::Total), count)),
                print.value(print.get(Statistic::Max)),
            ),
            MeterKind::FunctionTimer => format!(
                "{id} delta_count={} throughput={} mean={}",
                whole_or_decimal(count),
                print.unitless_rate(count),
                print.time(mean(print.get(Statistic::TotalTime), count)),
            ),
        };
        Some(line)
    }
}

impl Publisher for LoggingPublisher {
    fn name(&self) -> &str {
        "logging"
    }

    fn publish(&self, snapshots: &[MeterSnapshot]) -> Result<(), PublishError> {
        let mut sorted: Vec<&MeterSnapshot> = snapshots.iter().collect();
        sorted.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.id.name().cmp(b.id.name()))
        });
        for snapshot in sorted {
            if let Some(line) = self.line(snapshot) {
                (self.sink)(&line);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for LoggingPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingPublisher")
            .field("step", &self.step)
            .field("base_time_unit", &self.base_time_unit)
            .field("log_inactive", &self.log_inactive)
            .finish_non_exhaustive()
    }
}

fn mean(total: f64, count: f64) -> f64 {
    if count == 0.0 {
        0.0
    } else {
        total / count
    }
}

// ── number formatting ──────────────────────────────────────────────

struct Printer<'a> {
    publisher: &'a LoggingPublisher,
    snapshot: &'a MeterSnapshot,
}

impl Printer<'_> {
    fn get(&self, statistic: Statistic) -> f64 {
        self.snapshot.get(statistic).unwrap_or(0.0)
    }

    fn step_seconds(&self) -> f64 {
        self.publisher.step.as_secs_f64()
    }

    fn rate(&self, value: f64) -> String {
        format!("{}/s", self.value(value / self.step_seconds()))
    }

    fn unitless_rate(&self, value: f64) -> String {
        format!("{}/s", decimal_or_nan(value / self.step_seconds()))
    }

    /// `time` is in the publisher's base time unit.
    fn time(&self, time: f64) -> String {
        human_time(self.publisher.base_time_unit.to_nanos(time))
    }

    fn value(&self, value: f64) -> String {
        match self.snapshot.id.base_unit() {
            Some("bytes") => human_bytes(value),
            Some(unit) => format!("{} {unit}", decimal_or_nan(value)),
            None => decimal_or_nan(value),
        }
    }
}

/// Up to six decimal places with trailing zeros dropped, or `NaN`.
pub(crate) fn decimal_or_nan(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞" } else { "-∞" }.to_string();
    }
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn whole_or_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        decimal_or_nan(value)
    }
}

/// Binary-prefixed byte counts: `512 B`, `1.5 KiB`, `3 MiB`.
pub(crate) fn human_bytes(bytes: f64) -> String {
    const UNIT: f64 = 1024.0;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];
    if bytes.is_nan() || bytes < UNIT {
        return format!("{} B", decimal_or_nan(bytes));
    }
    let exp = ((bytes.ln() / UNIT.ln()) as usize).clamp(1, PREFIXES.len());
    format!(
        "{} {}iB",
        decimal_or_nan(bytes / UNIT.powi(exp as i32)),
        PREFIXES[exp - 1]
    )
}

/// A time in nanoseconds scaled to the largest unit it reaches.
pub(crate) fn human_time(nanos: f64) -> String {
    const SCALES: [(f64, &str); 6] = [
        (3_600e9, "h"),
        (60e9, "m"),
        (1e9, "s"),
        (1e6, "ms"),
        (1e3, "us"),
        (1.0, "ns"),
    ];
    if nanos.is_nan() {
        return "NaN".to_string();
    }
    let magnitude = nanos.abs();
    let (scale, suffix) = SCALES
        .iter()
        .copied()
        .find(|(scale, _)| magnitude >= *scale)
        .unwrap_or((1.0, "ns"));
    format!("{}{suffix}", decimal_or_nan(nanos / scale))
}
