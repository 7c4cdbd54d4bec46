//! Above-threshold event segmentation for explainability.
//!
//! Events describe *why* a battery is sized the way it is (how long and how
//! energetic the worst excursion is). They never drive dispatch.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::profile::LoadProfile;

/// Events at or under this length count as spikes (hours).
pub const SPIKE_MAX_HOURS: f64 = 1.0;

/// Events at or over this length count as sustained plateaus (hours).
pub const SUSTAINED_MIN_HOURS: f64 = 4.0;

/// A maximal run of consecutive intervals strictly above a threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakEvent {
    /// First interval above the threshold.
    pub start_index: usize,
    /// Last interval above the threshold (inclusive).
    pub end_index: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Highest demand during the event (kW).
    pub peak_kw: f64,
    /// Σ (kw − threshold)·Δt over the event (kWh).
    pub energy_above_threshold_kwh: f64,
}

impl PeakEvent {
    pub fn interval_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn duration_hours(&self, interval_hours: f64) -> f64 {
        self.interval_count() as f64 * interval_hours
    }
}

/// Segments `profile` into events above `threshold_kw`.
///
/// An event opens on the first interval exceeding the threshold and extends
/// while consecutive intervals exceed it. A single interval at or below the
/// threshold closes it; gaps are never merged.
pub fn detect_peak_events(profile: &LoadProfile, threshold_kw: f64) -> Vec<PeakEvent> {
    let dt = profile.interval_hours();
    let intervals = profile.intervals();
    let mut events = Vec::new();
    let mut current: Option<PeakEvent> = None;

    for (index, interval) in intervals.iter().enumerate() {
        if interval.kw > threshold_kw {
            let excess_kwh = (interval.kw - threshold_kw) * dt;
            match current.as_mut() {
                Some(event) => {
                    event.end_index = index;
                    event.end_time = interval.timestamp;
                    event.peak_kw = event.peak_kw.max(interval.kw);
                    event.energy_above_threshold_kwh += excess_kwh;
                }
                None => {
                    current = Some(PeakEvent {
                        start_index: index,
                        end_index: index,
                        start_time: interval.timestamp,
                        end_time: interval.timestamp,
                        peak_kw: interval.kw,
                        energy_above_threshold_kwh: excess_kwh,
                    });
                }
            }
        } else if let Some(event) = current.take() {
            events.push(event);
        }
    }
    events.extend(current);
    events
}

/// Shape of the above-threshold excursions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakPattern {
    /// Nothing exceeds the threshold.
    None,
    /// Every event is short: power-limited sizing.
    Spiky,
    /// At least one long plateau: energy-limited sizing.
    Sustained,
    /// Neither all short nor any long.
    Mixed,
}

impl fmt::Display for PeakPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "no events",
            Self::Spiky => "short spikes",
            Self::Sustained => "sustained plateaus",
            Self::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// Aggregate view of a set of events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakEventSummary {
    pub event_count: usize,
    pub longest_duration_hours: f64,
    /// Energy above threshold of the most energetic event (kWh).
    pub max_event_energy_kwh: f64,
    pub total_energy_above_kwh: f64,
    pub pattern: PeakPattern,
}

/// Summarizes `events` and classifies their pattern.
pub fn summarize_peak_events(events: &[PeakEvent], interval_hours: f64) -> PeakEventSummary {
    let longest = events
        .iter()
        .map(|e| e.duration_hours(interval_hours))
        .fold(0.0, f64::max);
    let max_energy = events
        .iter()
        .map(|e| e.energy_above_threshold_kwh)
        .fold(0.0, f64::max);
    let total_energy = events.iter().map(|e| e.energy_above_threshold_kwh).sum();

    let pattern = if events.is_empty() {
        PeakPattern::None
    } else if longest >= SUSTAINED_MIN_HOURS {
        PeakPattern::Sustained
    } else if longest <= SPIKE_MAX_HOURS {
        PeakPattern::Spiky
    } else {
        PeakPattern::Mixed
    };

    PeakEventSummary {
        event_count: events.len(),
        longest_duration_hours: longest,
        max_event_energy_kwh: max_energy,
        total_energy_above_kwh: total_energy,
        pattern,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn profile(kw: &[f64], step_minutes: i64) -> LoadProfile {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        LoadProfile::from_kw(start, step_minutes, kw).expect("valid profile")
    }

    #[test]
    fn no_events_below_threshold() {
        let p = profile(&[10.0, 20.0, 30.0], 60);
        assert!(detect_peak_events(&p, 30.0).is_empty());
    }

    #[test]
    fn single_gap_splits_events() {
        let p = profile(&[50.0, 60.0, 40.0, 70.0, 40.0], 60);
        let events = detect_peak_events(&p, 45.0);
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].start_index, events[0].end_index), (0, 1));
        assert_eq!(events[0].peak_kw, 60.0);
        assert!((events[0].energy_above_threshold_kwh - 20.0).abs() < 1e-9);
        assert_eq!((events[1].start_index, events[1].end_index), (3, 3));
    }

    #[test]
    fn event_running_to_the_end_is_closed() {
        let p = profile(&[10.0, 60.0, 70.0], 30);
        let events = detect_peak_events(&p, 50.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end_index, 2);
        assert!((events[0].energy_above_threshold_kwh - 15.0).abs() < 1e-9);
        assert_eq!(events[0].duration_hours(p.interval_hours()), 1.0);
    }

    #[test]
    fn equal_to_threshold_is_not_an_event() {
        let p = profile(&[50.0, 50.0], 60);
        assert!(detect_peak_events(&p, 50.0).is_empty());
    }

    #[test]
    fn pattern_classification() {
        let spiky = profile(&[10.0, 60.0, 10.0, 60.0, 10.0], 60);
        let s = summarize_peak_events(&detect_peak_events(&spiky, 50.0), 1.0);
        assert_eq!(s.pattern, PeakPattern::Spiky);
        assert_eq!(s.event_count, 2);

        let sustained = profile(&[60.0; 5], 60);
        let s = summarize_peak_events(&detect_peak_events(&sustained, 50.0), 1.0);
        assert_eq!(s.pattern, PeakPattern::Sustained);
        assert_eq!(s.longest_duration_hours, 5.0);
        assert!((s.max_event_energy_kwh - 50.0).abs() < 1e-9);

        let mixed = profile(&[60.0, 60.0, 10.0], 60);
        let s = summarize_peak_events(&detect_peak_events(&mixed, 50.0), 1.0);
        assert_eq!(s.pattern, PeakPattern::Mixed);

        let s = summarize_peak_events(&[], 1.0);
        assert_eq!(s.pattern, PeakPattern::None);
    }
}
