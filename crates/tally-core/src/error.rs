//! Error types raised on the recording path.

use thiserror::Error;

/// Errors from recording a value into a meter or accumulator.
///
/// These are programming errors signalled synchronously to the caller;
/// the rejected value is never applied, so the tracked statistics stay
/// intact for the rest of the step.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum RecordError {
    /// A negative amount was given where only non-negative values are
    /// meaningful (latencies, sizes, maxima).
    #[error("negative value {value} rejected")]
    Negative {
        /// The rejected value.
        value: f64,
    },
    /// NaN cannot be ordered against the tracked maximum.
    #[error("NaN rejected")]
    NotANumber,
}

impl RecordError {
    /// Check that `value` is a non-negative number.
    pub fn check_non_negative(value: f64) -> Result<f64, RecordError> {
        if value.is_nan() {
            Err(RecordError::NotANumber)
        } else if value < 0.0 {
            Err(RecordError::Negative { value })
        } else {
            Ok(value)
        }
    }
}
