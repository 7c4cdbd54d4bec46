//! Monthly billing-peak arithmetic.
//!
//! Demand charges bill each month's single highest interval, so reductions are
//! always measured month by month and summed, never taken from one global peak.

use std::collections::BTreeMap;

use crate::profile::{LoadProfile, MonthKey};

use super::types::SimulationResult;

/// Billing months per year, used to annualize partial-year datasets.
pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Raw month peak minus dispatched month peak, per month (kW, never negative).
pub fn monthly_peak_reductions(
    profile: &LoadProfile,
    result: &SimulationResult,
) -> BTreeMap<MonthKey, f64> {
    let raw = profile.monthly_peaks();
    let net = result.monthly_net_peaks(profile);
    raw.into_iter()
        .map(|(month, raw_peak)| {
            let net_peak = net.get(&month).copied().unwrap_or(raw_peak);
            (month, (raw_peak - net_peak).max(0.0))
        })
        .collect()
}

/// Annual demand-charge savings from a sum of monthly peak reductions.
///
/// `kw_month_sum` covers `months` billing months; the result is scaled to
/// twelve so datasets shorter or longer than a year compare fairly.
pub fn annualized_savings(kw_month_sum: f64, demand_rate: f64, months: usize) -> f64 {
    if months == 0 {
        return 0.0;
    }
    kw_month_sum * demand_rate * MONTHS_PER_YEAR / months as f64
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::battery::BatterySpec;
    use crate::profile::Interval;
    use crate::sim::simulate;

    #[test]
    fn reductions_are_per_month() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 15).and_then(|d| d.and_hms_opt(12, 0, 0));
        let feb = NaiveDate::from_ymd_opt(2024, 2, 15).and_then(|d| d.and_hms_opt(12, 0, 0));
        let (jan, feb) = (jan.expect("jan"), feb.expect("feb"));
        let hour = chrono::TimeDelta::hours(1);
        let profile = LoadProfile::new(vec![
            Interval::new(jan, 50.0),
            Interval::new(jan + hour, 100.0),
            Interval::new(feb, 50.0),
            Interval::new(feb + hour, 90.0),
        ])
        .unwrap();
        // Plenty of energy and power: both months shave to the threshold.
        let result = simulate(&profile, &BatterySpec::new(500.0, 500.0, 1.0), 70.0).unwrap();
        let reductions = monthly_peak_reductions(&profile, &result);
        let values: Vec<f64> = reductions.values().copied().collect();
        assert_eq!(values, vec![30.0, 20.0]);
    }

    #[test]
    fn annualization_scales_to_twelve_months() {
        assert_eq!(annualized_savings(120.0, 10.0, 12), 1200.0);
        assert_eq!(annualized_savings(10.0, 10.0, 1), 1200.0);
        assert_eq!(annualized_savings(10.0, 10.0, 0), 0.0);
    }
}
