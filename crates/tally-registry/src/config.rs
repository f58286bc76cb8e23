//! Registry configuration, property loading, and duration text.
//!
//! [`StepRegistryConfig`] is a plain struct with documented defaults.
//! [`validate()`](StepRegistryConfig::validate) checks it before a
//! registry is built. [`from_properties`](StepRegistryConfig::from_properties)
//! fills it from flat `prefix.key` properties, falling back to the
//! default for every key that is absent.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::time::Duration;

use tally_core::TimeUnit;
use thiserror::Error;

// ── PropertySource ─────────────────────────────────────────────────

/// Flat key/value lookup that configuration is loaded from.
pub trait PropertySource {
    /// Value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

impl<S: BuildHasher> PropertySource for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl<F> PropertySource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors from loading or validating a [`StepRegistryConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration property could not be parsed.
    #[error("{key}: cannot parse {value:?} as a duration")]
    InvalidDuration {
        /// Full property key.
        key: String,
        /// Raw property value.
        value: String,
    },
    /// An integer property could not be parsed.
    #[error("{key}: cannot parse {value:?} as a number")]
    InvalidNumber {
        /// Full property key.
        key: String,
        /// Raw property value.
        value: String,
    },
    /// A boolean property was neither `true` nor `false`.
    #[error("{key}: expected true or false, got {value:?}")]
    InvalidBool {
        /// Full property key.
        key: String,
        /// Raw property value.
        value: String,
    },
    /// The step is shorter than one millisecond.
    #[error("step must be at least 1ms, got {configured:?}")]
    StepZero {
        /// The configured step.
        configured: Duration,
    },
    /// `num_threads` is zero.
    #[error("num_threads must be at least 1")]
    NumThreadsZero,
    /// `batch_size` is zero.
    #[error("batch_size must be at least 1")]
    BatchSizeZero,
}

// ── StepRegistryConfig ─────────────────────────────────────────────

/// Configuration for a [`StepMeterRegistry`](crate::StepMeterRegistry).
///
/// The timeouts and thread count are not used by the registry itself;
/// they are carried for publishers that talk to a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRegistryConfig {
    /// Property prefix this config was loaded under. Default: `"tally"`.
    pub prefix: String,
    /// Step length: how often meters roll over and publish. Default: 60s.
    pub step: Duration,
    /// Whether the registry publishes at all. Default: true.
    pub enabled: bool,
    /// Threads a publisher may use for backend requests. Default: 2.
    pub num_threads: usize,
    /// Backend connect timeout. Default: 1s.
    pub connect_timeout: Duration,
    /// Backend read timeout. Default: 10s.
    pub read_timeout: Duration,
    /// Most snapshots handed to the publisher per call. Default: 10000.
    pub batch_size: usize,
    /// Unit timers report in. Default: seconds.
    pub base_time_unit: TimeUnit,
    /// Whether logging publishers include meters with no activity in the
    /// last step. Default: false.
    pub log_inactive: bool,
}

impl Default for StepRegistryConfig {
    fn default() -> Self {
        Self {
            prefix: "tally".to_string(),
            step: Duration::from_secs(60),
            enabled: true,
            num_threads: 2,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(10),
            batch_size: 10_000,
            base_time_unit: TimeUnit::Seconds,
            log_inactive: false,
        }
    }
}

impl StepRegistryConfig {
    /// Check the invariants a registry relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_millis() == 0 {
            return Err(ConfigError::StepZero {
                configured: self.step,
            });
        }
        if self.num_threads == 0 {
            return Err(ConfigError::NumThreadsZero);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSizeZero);
        }
        Ok(())
    }

    /// Step length in whole milliseconds.
    pub fn step_millis(&self) -> u64 {
        u64::try_from(self.step.as_millis()).unwrap_or(u64::MAX)
    }

    /// Load from `{prefix}.step`, `{prefix}.enabled`,
    /// `{prefix}.numThreads`, `{prefix}.connectTimeout`,
    /// `{prefix}.readTimeout`, `{prefix}.batchSize` and
    /// `{prefix}.logInactive`. Absent keys keep their defaults. The
    /// result is validated.
    pub fn from_properties(
        prefix: &str,
        source: &impl PropertySource,
    ) -> Result<Self, ConfigError> {
        let loader = Loader { prefix, source };
        let defaults = Self::default();
        let config = Self {
            prefix: prefix.to_string(),
            step: loader.duration("step")?.unwrap_or(defaults.step),
            enabled: loader.bool("enabled")?.unwrap_or(defaults.enabled),
            num_threads: loader.number("numThreads")?.unwrap_or(defaults.num_threads),
            connect_timeout: loader
                .duration("connectTimeout")?
                .unwrap_or(defaults.connect_timeout),
            read_timeout: loader
                .duration("readTimeout")?
                .unwrap_or(defaults.read_timeout),
            batch_size: loader.number("batchSize")?.unwrap_or(defaults.batch_size),
            base_time_unit: defaults.base_time_unit,
            log_inactive: loader.bool("logInactive")?.unwrap_or(defaults.log_inactive),
        };
        config.validate()?;
        Ok(config)
    }
}

struct Loader<'a, P> {
    prefix: &'a str,
    source: &'a P,
}

impl<P: PropertySource> Loader<'_, P> {
    fn raw(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{}.{name}", self.prefix);
        self.source.get(&key).map(|value| (key, value))
    }

    fn duration(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        self.raw(name)
            .map(|(key, value)| {
                parse_duration(&value).ok_or(ConfigError::InvalidDuration { key, value })
            })
            .transpose()
    }

    fn number(&self, name: &str) -> Result<Option<usize>, ConfigError> {
        self.raw(name)
            .map(|(key, value)| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { key, value })
            })
            .transpose()
    }

    fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.raw(name)
            .map(|(key, value)| match value.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::InvalidBool { key, value }),
            })
            .transpose()
    }
}

// ── duration text ──────────────────────────────────────────────────

/// Parse `"10s"`, `"1_500ms"`, `"2 m"` and the like.
///
/// Accepts a whole number followed by one of `ns`, `ms`, `s`, `m`, `h`
/// or `d`, case-insensitively. Underscores, commas and spaces anywhere in
/// the text are ignored. Returns `None` for anything else.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '_' | ',' | ' '))
        .collect::<String>()
        .to_ascii_lowercase();

    const UNITS: [(&str, u64); 6] = [
        ("ns", 1),
        ("ms", 1_000_000),
        ("s", 1_000_000_000),
        ("m", 60_000_000_000),
        ("h", 3_600_000_000_000),
        ("d", 86_400_000_000_000),
    ];
    // Two-letter suffixes come first so "ms" is not read as "m".
    let (amount, nanos_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, nanos)| cleaned.strip_suffix(suffix).map(|rest| (rest, *nanos)))?;
    let amount: u64 = amount.parse().ok()?;
    amount.checked_mul(nanos_per_unit).map(Duration::from_nanos)
}

/// Render a duration for log messages: `"1h 2m 3.5s"`.
///
/// Hours are not folded into days. Sub-second precision is kept to the
/// nanosecond with trailing zeros dropped. A zero duration renders as
/// `"0s"`.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3_600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;
    let nanos = duration.subsec_nanos();

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || nanos > 0 {
        if nanos > 0 {
            let fraction = format!("{nanos:09}");
            parts.push(format!("{seconds}.{}s", fraction.trim_end_matches('0')));
        } else {
            parts.push(format!("{seconds}s"));
        }
    }
    if parts.is_empty() {
        return "0s".to_string();
    }
    parts.join(" ")
}
