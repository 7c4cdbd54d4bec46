//! Dispatch result types shared by the simulator and its consumers.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::profile::{LoadProfile, MonthKey};
use crate::profile::load_profile::monthly_peaks_of;

/// Outcome of one flat-threshold dispatch run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    /// Threshold the battery tried to hold (kW).
    pub threshold_kw: f64,
    /// Interval duration used for energy accounting (hours).
    pub interval_hours: f64,
    /// Peak of the raw load series (kW).
    pub original_peak_kw: f64,
    /// Peak of the post-dispatch series (kW).
    pub new_peak_kw: f64,
    /// Grid-side energy drawn to charge the battery (kWh).
    pub energy_charged_kwh: f64,
    /// Energy delivered by the battery to the load (kWh).
    pub energy_discharged_kwh: f64,
    /// Energy removed from grid import by discharging (kWh).
    pub savings_kwh: f64,
    /// Post-dispatch net load per interval (kW).
    pub net_load_kw: Vec<f64>,
    /// Stored energy after each interval (kWh).
    pub soc_history_kwh: Vec<f64>,
}

impl SimulationResult {
    /// Raw peak minus dispatched peak, never negative.
    pub fn peak_reduction_kw(&self) -> f64 {
        (self.original_peak_kw - self.new_peak_kw).max(0.0)
    }

    /// Whether the dispatched series stays at or under the threshold.
    pub fn holds_threshold(&self, epsilon_kw: f64) -> bool {
        self.new_peak_kw <= self.threshold_kw + epsilon_kw
    }

    /// Billing peak of the dispatched series per month.
    pub fn monthly_net_peaks(&self, profile: &LoadProfile) -> BTreeMap<MonthKey, f64> {
        monthly_peaks_of(
            profile
                .intervals()
                .iter()
                .zip(&self.net_load_kw)
                .map(|(interval, &kw)| (interval.timestamp, kw)),
        )
    }
}

impl fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threshold={:.2} kW | peak {:.2} -> {:.2} kW | charged={:.2} kWh  \
             discharged={:.2} kWh  shaved={:.2} kWh",
            self.threshold_kw,
            self.original_peak_kw,
            self.new_peak_kw,
            self.energy_charged_kwh,
            self.energy_discharged_kwh,
            self.savings_kwh,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(original: f64, new: f64, threshold: f64) -> SimulationResult {
        SimulationResult {
            threshold_kw: threshold,
            interval_hours: 1.0,
            original_peak_kw: original,
            new_peak_kw: new,
            energy_charged_kwh: 0.0,
            energy_discharged_kwh: 0.0,
            savings_kwh: 0.0,
            net_load_kw: Vec::new(),
            soc_history_kwh: Vec::new(),
        }
    }

    #[test]
    fn peak_reduction_is_never_negative() {
        assert_eq!(result(100.0, 80.0, 80.0).peak_reduction_kw(), 20.0);
        assert_eq!(result(50.0, 60.0, 60.0).peak_reduction_kw(), 0.0);
    }

    #[test]
    fn holds_threshold_uses_epsilon() {
        assert!(result(100.0, 80.000_000_1, 80.0).holds_threshold(1e-6));
        assert!(!result(100.0, 81.0, 80.0).holds_threshold(1e-6));
    }

    #[test]
    fn display_does_not_panic() {
        let s = format!("{}", result(100.0, 80.0, 80.0));
        assert!(s.contains("threshold=80.00"));
    }
}
