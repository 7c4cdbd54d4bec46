//! Input validation errors raised by the dispatch and sizing core.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Fatal input error. No partial result is produced when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    /// The load series has no intervals at all.
    #[error("load profile is empty")]
    EmptyProfile,

    /// The load series is too short to infer an interval duration.
    #[error("load profile needs at least {min} intervals, got {actual}")]
    ProfileTooShort { min: usize, actual: usize },

    /// Timestamps are not strictly increasing.
    #[error("timestamps must be strictly increasing: interval {index} at {current} follows {previous}")]
    NonMonotonicTimestamps {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    /// A load value is NaN or infinite.
    #[error("load at interval {index} is not finite ({value})")]
    NonFiniteLoad { index: usize, value: f64 },

    /// `min_soc` is not strictly below `max_soc`.
    #[error("min_soc ({min_soc}) must be below max_soc ({max_soc})")]
    InvalidSocBounds { min_soc: f64, max_soc: f64 },

    /// Round-trip efficiency outside `(0, 1]`.
    #[error("round-trip efficiency {0} is outside (0, 1]")]
    InvalidEfficiency(f64),

    /// Any other out-of-range battery field.
    #[error("battery field `{field}` is invalid: {message}")]
    InvalidBattery {
        field: &'static str,
        message: String,
    },

    /// Dispatch threshold below zero or not finite.
    #[error("threshold {0} kW must be finite and >= 0")]
    InvalidThreshold(f64),

    /// Demand rate below zero or not finite.
    #[error("demand rate {0} $/kW-month must be finite and >= 0")]
    InvalidDemandRate(f64),

    /// System cost below zero or not finite.
    #[error("system cost {0} must be finite and >= 0")]
    InvalidSystemCost(f64),

    /// Target reduction outside `(0, 100)` percent.
    #[error("target reduction {0}% must be within (0, 100)")]
    InvalidTargetReduction(f64),

    /// Threshold search bounds that cannot produce a candidate.
    #[error("threshold bounds are invalid: {0}")]
    InvalidBounds(String),

    /// A dispatched series does not line up with its load profile.
    #[error("series has {actual} values but the profile has {expected} intervals")]
    SeriesLengthMismatch { expected: usize, actual: usize },

    /// Rate schedule that cannot be evaluated.
    #[error("rate schedule `{name}` is invalid: {message}")]
    InvalidSchedule { name: String, message: String },
}

/// Checks that `value` is finite and non-negative, mapping failures with `err`.
pub(crate) fn non_negative(value: f64, err: fn(f64) -> InputError) -> Result<f64, InputError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(err(value))
    }
}

/// Divides `numerator` by `denominator`, yielding infinity instead of NaN or
/// a negative ratio when the denominator is not positive.
pub fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && numerator.is_finite() {
        numerator / denominator
    } else {
        f64::INFINITY
    }
}
