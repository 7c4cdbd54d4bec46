//! Validated interval load series and its calendar-month partition.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::InputError;

/// Minimum number of intervals needed to infer an interval duration.
pub const MIN_INTERVALS: usize = 2;

/// One metered interval: the average demand over the interval starting at `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Interval start, already normalized to the facility's local time.
    pub timestamp: NaiveDateTime,
    /// Average demand over the interval (kW). Zero and negative values are kept.
    pub kw: f64,
}

impl Interval {
    pub fn new(timestamp: NaiveDateTime, kw: f64) -> Self {
        Self { timestamp, kw }
    }
}

/// Calendar month used as the demand-charge billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An ordered, validated load series.
///
/// Construction enforces the invariants every downstream component relies on:
/// at least [`MIN_INTERVALS`] intervals, strictly increasing timestamps and
/// finite kW values. The interval duration is the median timestamp delta, so a
/// few missing readings do not distort it.
///
/// # Examples
///
/// ```
/// use bess_sizing::profile::LoadProfile;
/// use chrono::NaiveDate;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let profile = LoadProfile::from_kw(start, 15, &[10.0, 20.0, 15.0]).unwrap();
/// assert_eq!(profile.interval_hours(), 0.25);
/// assert_eq!(profile.peak_kw(), 20.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadProfile {
    intervals: Vec<Interval>,
    interval_hours: f64,
}

impl LoadProfile {
    /// Validates `intervals` and infers the interval duration.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] for empty or too-short series, non-monotonic
    /// timestamps and non-finite kW values.
    pub fn new(intervals: Vec<Interval>) -> Result<Self, InputError> {
        if intervals.is_empty() {
            return Err(InputError::EmptyProfile);
        }
        if intervals.len() < MIN_INTERVALS {
            return Err(InputError::ProfileTooShort {
                min: MIN_INTERVALS,
                actual: intervals.len(),
            });
        }

        for (index, interval) in intervals.iter().enumerate() {
            if !interval.kw.is_finite() {
                return Err(InputError::NonFiniteLoad {
                    index,
                    value: interval.kw,
                });
            }
        }

        let mut deltas_secs = Vec::with_capacity(intervals.len() - 1);
        for (index, pair) in intervals.windows(2).enumerate() {
            let (previous, current) = (pair[0].timestamp, pair[1].timestamp);
            if current <= previous {
                return Err(InputError::NonMonotonicTimestamps {
                    index: index + 1,
                    previous,
                    current,
                });
            }
            deltas_secs.push((current - previous).num_seconds());
        }
        deltas_secs.sort_unstable();
        let median_secs = deltas_secs[deltas_secs.len() / 2];

        Ok(Self {
            intervals,
            interval_hours: median_secs as f64 / 3600.0,
        })
    }

    /// Builds a profile from evenly spaced kW readings starting at `start`.
    ///
    /// # Errors
    ///
    /// Same as [`LoadProfile::new`].
    pub fn from_kw(start: NaiveDateTime, step_minutes: i64, kw: &[f64]) -> Result<Self, InputError> {
        let step = chrono::TimeDelta::minutes(step_minutes);
        let intervals = kw
            .iter()
            .enumerate()
            .map(|(i, &value)| Interval::new(start + step * i as i32, value))
            .collect();
        Self::new(intervals)
    }

    /// A slice of an already-validated profile; keeps the parent's duration.
    fn sub_profile(&self, intervals: &[Interval]) -> Self {
        Self {
            intervals: intervals.to_vec(),
            interval_hours: self.interval_hours,
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Interval duration in hours (median timestamp delta).
    pub fn interval_hours(&self) -> f64 {
        self.interval_hours
    }

    /// Iterator over the kW values in order.
    pub fn kw(&self) -> impl Iterator<Item = f64> + '_ {
        self.intervals.iter().map(|i| i.kw)
    }

    /// Highest interval demand (kW).
    pub fn peak_kw(&self) -> f64 {
        self.kw().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Index of the first interval reaching the peak.
    pub fn peak_index(&self) -> usize {
        let peak = self.peak_kw();
        self.intervals.iter().position(|i| i.kw == peak).unwrap_or(0)
    }

    /// Mean demand over all intervals (kW).
    pub fn average_kw(&self) -> f64 {
        self.kw().sum::<f64>() / self.len() as f64
    }

    /// Average over peak; 0 when the peak is not positive.
    pub fn load_factor(&self) -> f64 {
        let peak = self.peak_kw();
        if peak > 0.0 {
            self.average_kw() / peak
        } else {
            0.0
        }
    }

    /// Total energy consumed over the series (kWh).
    pub fn energy_kwh(&self) -> f64 {
        self.kw().sum::<f64>() * self.interval_hours
    }

    /// Splits the series into calendar months, in chronological order.
    ///
    /// Each month keeps the parent interval duration, so a month holding a
    /// single reading is still a usable profile.
    pub fn months(&self) -> Vec<(MonthKey, LoadProfile)> {
        let mut months = Vec::new();
        let mut start = 0;
        for i in 1..=self.intervals.len() {
            let boundary = i == self.intervals.len()
                || MonthKey::of(&self.intervals[i].timestamp)
                    != MonthKey::of(&self.intervals[start].timestamp);
            if boundary {
                let key = MonthKey::of(&self.intervals[start].timestamp);
                months.push((key, self.sub_profile(&self.intervals[start..i])));
                start = i;
            }
        }
        months
    }

    /// Number of distinct billing months covered.
    pub fn month_count(&self) -> usize {
        self.months().len()
    }

    /// Billing peak (max interval kW) per month.
    pub fn monthly_peaks(&self) -> BTreeMap<MonthKey, f64> {
        monthly_peaks_of(self.intervals.iter().map(|i| (i.timestamp, i.kw)))
    }
}

/// Month-by-month maximum of a `(timestamp, kw)` series.
pub(crate) fn monthly_peaks_of(
    series: impl Iterator<Item = (NaiveDateTime, f64)>,
) -> BTreeMap<MonthKey, f64> {
    let mut peaks = BTreeMap::new();
    for (timestamp, kw) in series {
        peaks
            .entry(MonthKey::of(&timestamp))
            .and_modify(|peak: &mut f64| *peak = peak.max(kw))
            .or_insert(kw);
    }
    peaks
}
