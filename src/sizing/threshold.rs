//! Value-maximizing dispatch threshold search for a fixed battery.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::battery::BatterySpec;
use crate::config::{SearchConfig, ThresholdBounds};
use crate::error::{InputError, guarded_ratio, non_negative};
use crate::profile::LoadProfile;
use crate::sim::billing::{MONTHS_PER_YEAR, monthly_peak_reductions};
use crate::sim::simulate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOptimization {
    pub optimal_threshold_kw: f64,
    /// Annual peak reduction at the chosen threshold, as a percentage of the raw peak.
    pub peak_reduction_percent: f64,
    /// Mean monthly billing-peak reduction at the chosen threshold (kW).
    pub monthly_peak_reduction_kw: f64,
    pub payback_years: f64,
    pub annual_savings: f64,
    /// False when no candidate fit the payback band and the closest was taken.
    pub within_bounds: bool,
    pub candidates_evaluated: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    threshold_kw: f64,
    monthly_reduction_kw: f64,
    peak_reduction_percent: f64,
    annual_savings: f64,
    payback_years: f64,
}

impl Candidate {
    /// Reduction bought per dollar; plain reduction when the system is free.
    fn value(&self, system_cost: f64) -> f64 {
        if system_cost > 0.0 {
            self.monthly_reduction_kw / system_cost
        } else {
            self.monthly_reduction_kw
        }
    }

    /// Years outside the payback band, zero inside it.
    fn band_distance(&self, bounds: &ThresholdBounds) -> f64 {
        if self.payback_years < bounds.min_payback_years {
            bounds.min_payback_years - self.payback_years
        } else if self.payback_years > bounds.max_payback_years {
            self.payback_years - bounds.max_payback_years
        } else {
            0.0
        }
    }

    fn in_band(&self, bounds: &ThresholdBounds) -> bool {
        (bounds.min_payback_years..=bounds.max_payback_years).contains(&self.payback_years)
    }
}

/// Grid-searches the dispatch threshold that buys the most peak reduction per
/// dollar while keeping simple payback inside `bounds`.
///
/// Candidates are `search.threshold_grid_steps + 1` evenly spaced thresholds
/// from `bounds.min_threshold_percent` of the raw peak up to the raw peak.
/// Each is simulated over the whole profile; savings are the mean monthly
/// billing-peak reduction × `demand_rate` × 12, and payback is
/// `system_cost / savings` (infinite without savings). Ties go to the lower
/// threshold. When no candidate fits the band, the one with the payback
/// closest to it is returned with `within_bounds = false`.
///
/// # Errors
///
/// Returns an [`InputError`] for an invalid battery, demand rate, system cost
/// or bounds, or a profile whose peak is not positive.
pub fn optimize_threshold_for_value(
    profile: &LoadProfile,
    spec: &BatterySpec,
    demand_rate: f64,
    system_cost: f64,
    bounds: ThresholdBounds,
    search: &SearchConfig,
) -> Result<ThresholdOptimization, InputError> {
    spec.validate()?;
    non_negative(demand_rate, InputError::InvalidDemandRate)?;
    non_negative(system_cost, InputError::InvalidSystemCost)?;
    validate_bounds(&bounds)?;

    let peak = profile.peak_kw();
    if peak <= 0.0 {
        return Err(InputError::InvalidBounds(format!(
            "raw peak {peak} kW leaves nothing to shave"
        )));
    }
    let low = peak * bounds.min_threshold_percent / 100.0;
    let steps = search.threshold_grid_steps.max(1);

    let candidates: Vec<Candidate> = (0..=steps)
        .into_par_iter()
        .map(|i| {
            let threshold_kw = low + (peak - low) * f64::from(i) / f64::from(steps);
            evaluate(profile, spec, threshold_kw, demand_rate, system_cost)
        })
        .collect::<Result<_, _>>()?;

    let mut best: Option<&Candidate> = None;
    for c in candidates.iter().filter(|c| c.in_band(&bounds)) {
        if best.is_none_or(|b| c.value(system_cost) > b.value(system_cost)) {
            best = Some(c);
        }
    }
    let within_bounds = best.is_some();
    if best.is_none() {
        for c in &candidates {
            if best.is_none_or(|b| c.band_distance(&bounds) < b.band_distance(&bounds)) {
                best = Some(c);
            }
        }
    }
    let best = best.copied().ok_or_else(|| {
        InputError::InvalidBounds("threshold grid produced no candidates".to_string())
    })?;

    debug!(
        threshold_kw = best.threshold_kw,
        payback_years = best.payback_years,
        within_bounds,
        "threshold optimized"
    );

    Ok(ThresholdOptimization {
        optimal_threshold_kw: best.threshold_kw,
        peak_reduction_percent: best.peak_reduction_percent,
        monthly_peak_reduction_kw: best.monthly_reduction_kw,
        payback_years: best.payback_years,
        annual_savings: best.annual_savings,
        within_bounds,
        candidates_evaluated: candidates.len(),
    })
}

fn validate_bounds(bounds: &ThresholdBounds) -> Result<(), InputError> {
    if !(bounds.min_payback_years >= 0.0 && bounds.max_payback_years >= bounds.min_payback_years)
    {
        return Err(InputError::InvalidBounds(format!(
            "payback band [{}, {}] years is empty or negative",
            bounds.min_payback_years, bounds.max_payback_years
        )));
    }
    if !(0.0..100.0).contains(&bounds.min_threshold_percent) {
        return Err(InputError::InvalidBounds(format!(
            "min threshold {}% must be within [0, 100)",
            bounds.min_threshold_percent
        )));
    }
    Ok(())
}

fn evaluate(
    profile: &LoadProfile,
    spec: &BatterySpec,
    threshold_kw: f64,
    demand_rate: f64,
    system_cost: f64,
) -> Result<Candidate, InputError> {
    let result = simulate(profile, spec, threshold_kw)?;
    let reductions = monthly_peak_reductions(profile, &result);
    let monthly_reduction_kw = if reductions.is_empty() {
        0.0
    } else {
        reductions.values().sum::<f64>() / reductions.len() as f64
    };
    let annual_savings = monthly_reduction_kw * demand_rate * MONTHS_PER_YEAR;

    Ok(Candidate {
        threshold_kw,
        monthly_reduction_kw,
        peak_reduction_percent: 100.0 * result.peak_reduction_kw() / result.original_peak_kw,
        annual_savings,
        payback_years: guarded_ratio(system_cost, annual_savings),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    /// One day, hourly: 50 kW base with a 4 h ramp to 100 kW at midday.
    fn profile() -> LoadProfile {
        let start = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        let mut kw = vec![50.0; 24];
        kw[11] = 70.0;
        kw[12] = 100.0;
        kw[13] = 100.0;
        kw[14] = 70.0;
        LoadProfile::from_kw(start, 60, &kw).expect("valid profile")
    }

    fn bounds(min: f64, max: f64) -> ThresholdBounds {
        ThresholdBounds {
            min_payback_years: min,
            max_payback_years: max,
            min_threshold_percent: 50.0,
        }
    }

    #[test]
    fn grid_size_follows_config() {
        let spec = BatterySpec::new(40.0, 30.0, 1.0);
        let search = SearchConfig {
            threshold_grid_steps: 10,
            ..SearchConfig::default()
        };
        let r = optimize_threshold_for_value(&profile(), &spec, 20.0, 10_000.0, bounds(0.0, 100.0), &search)
            .unwrap();
        assert_eq!(r.candidates_evaluated, 11);
    }

    #[test]
    fn picks_most_reduction_within_band() {
        // Fixed cost: the best value is the largest holdable reduction.
        let spec = BatterySpec::new(40.0, 30.0, 1.0);
        let search = SearchConfig {
            threshold_grid_steps: 50,
            ..SearchConfig::default()
        };
        let r = optimize_threshold_for_value(&profile(), &spec, 20.0, 10_000.0, bounds(0.0, 100.0), &search)
            .unwrap();
        assert!(r.within_bounds);
        assert!(r.optimal_threshold_kw < 100.0);
        assert!(r.annual_savings > 0.0);
        assert!((r.payback_years - 10_000.0 / r.annual_savings).abs() < 1e-9);
        let sim = simulate(&profile(), &spec, r.optimal_threshold_kw).unwrap();
        assert!(r.peak_reduction_percent > 0.0);
        assert!((sim.peak_reduction_kw() - r.monthly_peak_reduction_kw).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_closest_payback() {
        // A huge system cost makes every payback exceed the band.
        let spec = BatterySpec::new(40.0, 30.0, 1.0);
        let r = optimize_threshold_for_value(
            &profile(),
            &spec,
            20.0,
            1e9,
            bounds(0.0, 5.0),
            &SearchConfig::default(),
        )
        .unwrap();
        assert!(!r.within_bounds);
        assert!(r.payback_years.is_finite());
        assert!(r.annual_savings > 0.0);
    }

    #[test]
    fn no_savings_reports_infinite_payback() {
        let spec = BatterySpec::new(0.0, 0.0, 1.0);
        let r = optimize_threshold_for_value(
            &profile(),
            &spec,
            20.0,
            1_000.0,
            bounds(0.0, 5.0),
            &SearchConfig::default(),
        )
        .unwrap();
        assert!(!r.within_bounds);
        assert_eq!(r.payback_years, f64::INFINITY);
        assert!(!r.peak_reduction_percent.is_nan());
    }

    #[test]
    fn rejects_inverted_band_and_bad_cost() {
        let spec = BatterySpec::new(40.0, 30.0, 1.0);
        let search = SearchConfig::default();
        assert!(matches!(
            optimize_threshold_for_value(&profile(), &spec, 20.0, 1.0, bounds(5.0, 1.0), &search),
            Err(InputError::InvalidBounds(_))
        ));
        assert_eq!(
            optimize_threshold_for_value(&profile(), &spec, 20.0, -1.0, bounds(0.0, 5.0), &search),
            Err(InputError::InvalidSystemCost(-1.0))
        );
    }
}
