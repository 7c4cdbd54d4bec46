//! Billing-max correct cap search.
//!
//! A demand charge bills each month's single worst interval, so a guaranteed
//! cap has to survive the worst event of the worst month. Each month is
//! searched independently for the lowest threshold the battery can hold, and
//! the highest of those monthly caps is the one the battery can guarantee.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::battery::BatterySpec;
use crate::config::SearchConfig;
use crate::error::{InputError, non_negative};
use crate::profile::{LoadProfile, MonthKey};
use crate::sim::billing::annualized_savings;
use crate::sim::simulate;
use crate::sim::simulator::FEASIBILITY_EPSILON_KW;

/// Search outcome for one billing month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCap {
    pub month: MonthKey,
    /// Undispatched billing peak of the month (kW).
    pub raw_peak_kw: f64,
    /// Lowest threshold found that the battery holds all month (kW).
    pub achieved_cap_kw: f64,
    /// Simulator calls spent on the search.
    pub iterations: u32,
}

impl MonthCap {
    pub fn reduction_kw(&self) -> f64 {
        (self.raw_peak_kw - self.achieved_cap_kw).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapDiscoveryResult {
    /// Highest monthly cap: the demand the battery holds in every month (kW).
    pub guaranteed_cap_kw: f64,
    pub per_month: BTreeMap<MonthKey, f64>,
    /// Month whose cap sets `guaranteed_cap_kw`.
    pub binding_month: Option<MonthKey>,
    /// Per-month detail, ordered by month.
    pub months: Vec<MonthCap>,
    /// Demand-charge savings of the monthly caps, annualized to twelve months.
    pub annual_savings: f64,
}

impl CapDiscoveryResult {
    /// Sum of monthly billing-peak reductions (kW-months).
    pub fn total_reduction_kw_months(&self) -> f64 {
        self.months.iter().map(MonthCap::reduction_kw).sum()
    }
}

/// Finds the lowest demand cap `spec` can hold in every calendar month of `profile`.
///
/// Per month, binary-searches `T ∈ [0, month raw peak]` for the smallest
/// threshold whose simulated month peak stays at or under `T` (within
/// [`FEASIBILITY_EPSILON_KW`]). The search stops when the bracket is narrower
/// than `search.tolerance_kw` or after `search.max_iterations` steps, and
/// reports the feasible end of the bracket. Months run in parallel; results
/// are ordered by month.
///
/// # Errors
///
/// Returns an [`InputError`] for an invalid battery or demand rate.
pub fn compute_cap_discovery_across_months(
    profile: &LoadProfile,
    spec: &BatterySpec,
    demand_rate: f64,
    search: &SearchConfig,
) -> Result<CapDiscoveryResult, InputError> {
    spec.validate()?;
    non_negative(demand_rate, InputError::InvalidDemandRate)?;

    let months: Vec<MonthCap> = profile
        .months()
        .par_iter()
        .map(|(month, month_profile)| discover_month_cap(*month, month_profile, spec, search))
        .collect::<Result<_, _>>()?;

    let mut guaranteed_cap_kw = f64::NEG_INFINITY;
    let mut binding_month = None;
    for m in &months {
        if m.achieved_cap_kw > guaranteed_cap_kw {
            guaranteed_cap_kw = m.achieved_cap_kw;
            binding_month = Some(m.month);
        }
    }
    if binding_month.is_none() {
        guaranteed_cap_kw = 0.0;
    }

    let per_month = months
        .iter()
        .map(|m| (m.month, m.achieved_cap_kw))
        .collect();
    let reduction: f64 = months.iter().map(MonthCap::reduction_kw).sum();

    Ok(CapDiscoveryResult {
        guaranteed_cap_kw,
        per_month,
        binding_month,
        annual_savings: annualized_savings(reduction, demand_rate, months.len()),
        months,
    })
}

fn discover_month_cap(
    month: MonthKey,
    profile: &LoadProfile,
    spec: &BatterySpec,
    search: &SearchConfig,
) -> Result<MonthCap, InputError> {
    let raw_peak_kw = profile.peak_kw();
    if raw_peak_kw <= 0.0 {
        return Ok(MonthCap {
            month,
            raw_peak_kw,
            achieved_cap_kw: raw_peak_kw,
            iterations: 0,
        });
    }

    // `hi` is always feasible: at the raw peak nothing needs shaving and
    // charging never lifts the load above the threshold.
    let mut lo = 0.0_f64;
    let mut hi = raw_peak_kw;
    let mut iterations = 0;
    while hi - lo > search.tolerance_kw && iterations < search.max_iterations {
        let mid = lo + (hi - lo) / 2.0;
        if simulate(profile, spec, mid)?.holds_threshold(FEASIBILITY_EPSILON_KW) {
            hi = mid;
        } else {
            lo = mid;
        }
        iterations += 1;
    }

    debug!(
        month = %month,
        raw_peak_kw,
        cap_kw = hi,
        iterations,
        "month cap search finished"
    );

    Ok(MonthCap {
        month,
        raw_peak_kw,
        achieved_cap_kw: hi,
        iterations,
    })
}
