//! Time units for reporting durations in a publisher's base unit.

use std::fmt;
use std::time::Duration;

/// A unit of time, from nanoseconds to days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    /// 10⁻⁹ s.
    Nanoseconds,
    /// 10⁻⁶ s.
    Microseconds,
    /// 10⁻³ s.
    Milliseconds,
    /// 1 s.
    Seconds,
    /// 60 s.
    Minutes,
    /// 3600 s.
    Hours,
    /// 86400 s.
    Days,
}

impl TimeUnit {
    /// Nanoseconds in one unit.
    pub const fn nanos_per_unit(self) -> f64 {
        match self {
            Self::Nanoseconds => 1.0,
            Self::Microseconds => 1e3,
            Self::Milliseconds => 1e6,
            Self::Seconds => 1e9,
            Self::Minutes => 60e9,
            Self::Hours => 3_600e9,
            Self::Days => 86_400e9,
        }
    }

    /// Convert `amount` of this unit to `target`.
    pub fn convert(self, amount: f64, target: TimeUnit) -> f64 {
        if self == target {
            return amount;
        }
        amount * self.nanos_per_unit() / target.nanos_per_unit()
    }

    /// Convert `amount` of this unit to nanoseconds.
    pub fn to_nanos(self, amount: f64) -> f64 {
        amount * self.nanos_per_unit()
    }

    /// Express a nanosecond count in this unit.
    pub fn from_nanos(self, nanos: f64) -> f64 {
        nanos / self.nanos_per_unit()
    }

    /// Express a [`Duration`] in this unit.
    pub fn from_duration(self, duration: Duration) -> f64 {
        self.from_nanos(duration.as_nanos() as f64)
    }

    /// Short suffix used in log output (`ns`, `ms`, `s`, ...).
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
            Self::Days => "d",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
