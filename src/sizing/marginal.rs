//! Unit-by-unit portfolio growth for one catalog battery.
//!
//! Quantity grows from one unit until a stopping rule rejects the next unit.
//! Every step records its decision and a sentence saying why, so a sizing
//! recommendation can always be traced back to the rule that ended it.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::battery::{BatterySpec, CatalogBattery};
use crate::config::{EngineConfig, ReductionMethod};
use crate::error::{InputError, guarded_ratio, non_negative};
use crate::profile::LoadProfile;
use crate::sim::billing::{annualized_savings, monthly_peak_reductions};
use crate::sim::simulate;
use crate::sim::simulator::FEASIBILITY_EPSILON_KW;

use super::cap_discovery::compute_cap_discovery_across_months;
use super::selector::Requirements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accept,
    Reject,
}

/// Rule that ended the quantity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The next unit paid back too slowly on its own.
    IncrementalPaybackCeiling,
    /// The next unit pushed capacity past the oversize multiple.
    Oversized,
    /// The target was already met and the next unit added too little.
    DiminishingReturns,
    /// The hard quantity ceiling was reached.
    QuantityCeiling,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IncrementalPaybackCeiling => "incremental payback ceiling",
            Self::Oversized => "oversize limit",
            Self::DiminishingReturns => "diminishing returns",
            Self::QuantityCeiling => "quantity ceiling",
        };
        f.write_str(s)
    }
}

/// One evaluated quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalStep {
    pub quantity: u32,
    pub total_capacity_kwh: f64,
    pub total_power_kw: f64,
    /// Sum of monthly billing-peak reductions (kW-months).
    pub total_peak_reduction_kw: f64,
    /// Annual peak minus the cap the portfolio holds (kW).
    pub peak_reduction_kw: f64,
    pub total_annual_savings: f64,
    pub total_system_cost: f64,
    pub incremental_savings: f64,
    pub incremental_cost: f64,
    pub incremental_payback: f64,
    pub meets_target: bool,
    pub decision: Decision,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalSummary {
    /// Highest accepted quantity; zero when the first unit was rejected.
    pub optimal_quantity: u32,
    pub total_capacity_kwh: f64,
    pub total_power_kw: f64,
    pub total_system_cost: f64,
    pub total_annual_savings: f64,
    pub total_peak_reduction_kw: f64,
    pub peak_reduction_kw: f64,
    pub payback_years: f64,
    pub meets_target: bool,
    /// Annual savings per dollar of system cost.
    pub value_score: f64,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalAnalysis {
    pub model_name: String,
    pub manufacturer: String,
    /// Unit degradation, carried for economic grading.
    pub degradation_rate: f64,
    pub steps: Vec<MarginalStep>,
    pub summary: MarginalSummary,
}

impl MarginalAnalysis {
    /// The step the summary was taken from, if any unit was accepted.
    pub fn optimal_step(&self) -> Option<&MarginalStep> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.decision == Decision::Accept)
    }
}

/// Portfolio performance at one quantity, before any decision.
#[derive(Debug, Clone, Copy, Default)]
struct Evaluation {
    total_peak_reduction_kw: f64,
    peak_reduction_kw: f64,
    total_annual_savings: f64,
    total_system_cost: f64,
    meets_target: bool,
}

/// Grows a portfolio of `battery` one unit at a time and stops at the first
/// unit the stopping rule rejects.
///
/// Each quantity is evaluated over the whole profile with
/// `config.marginal.method`. The unit is rejected, ending the search, when:
/// its incremental payback exceeds `max_incremental_payback_years`; or, from
/// the second unit on, total capacity exceeds `oversize_multiplier` × the
/// minimum capacity the requirements call for; or the target was already met
/// without it and it adds less than `min_incremental_savings`. Reaching
/// `max_quantity` accepts the last unit and stops.
///
/// # Errors
///
/// Returns an [`InputError`] for an invalid catalog entry or demand rate.
pub fn analyze_marginal_portfolio(
    profile: &LoadProfile,
    battery: &CatalogBattery,
    demand_rate: f64,
    requirements: &Requirements,
    config: &EngineConfig,
) -> Result<MarginalAnalysis, InputError> {
    battery.validate()?;
    non_negative(demand_rate, InputError::InvalidDemandRate)?;

    let rules = &config.marginal;
    let min_capacity_kwh = minimum_capacity_kwh(&battery.spec, requirements);
    let max_capacity_kwh = rules.oversize_multiplier * min_capacity_kwh;

    let mut steps: Vec<MarginalStep> = Vec::new();
    let mut previous = Evaluation::default();
    let mut accepted: Option<(u32, Evaluation)> = None;
    let mut stop_reason = StopReason::QuantityCeiling;

    for quantity in 1..=rules.max_quantity {
        let spec = battery.spec_for(quantity);
        let mut current = evaluate(profile, &spec, demand_rate, requirements, config)?;
        current.total_system_cost = battery.system_cost(quantity);

        let incremental_savings = current.total_annual_savings - previous.total_annual_savings;
        let incremental_cost = current.total_system_cost - previous.total_system_cost;
        let incremental_payback = guarded_ratio(incremental_cost, incremental_savings);

        let rejection = if incremental_payback > rules.max_incremental_payback_years {
            Some((
                StopReason::IncrementalPaybackCeiling,
                format!(
                    "unit {quantity} pays back in {} against a {:.1} yr ceiling",
                    years(incremental_payback),
                    rules.max_incremental_payback_years
                ),
            ))
        } else if quantity >= 2 && spec.capacity_kwh > max_capacity_kwh {
            Some((
                StopReason::Oversized,
                format!(
                    "{:.0} kWh exceeds {:.1}x the {:.0} kWh minimum",
                    spec.capacity_kwh, rules.oversize_multiplier, min_capacity_kwh
                ),
            ))
        } else if previous.meets_target && incremental_savings < rules.min_incremental_savings {
            Some((
                StopReason::DiminishingReturns,
                format!(
                    "target already met; unit {quantity} adds ${incremental_savings:.0}/yr, \
                     below ${:.0}/yr",
                    rules.min_incremental_savings
                ),
            ))
        } else {
            None
        };

        let (decision, reason) = match rejection {
            Some((why, reason)) => {
                stop_reason = why;
                (Decision::Reject, reason)
            }
            None if quantity == rules.max_quantity => (
                Decision::Accept,
                format!("unit {quantity} accepted; quantity ceiling reached"),
            ),
            None => (
                Decision::Accept,
                format!(
                    "unit {quantity} adds ${incremental_savings:.0}/yr, pays back in {}{}",
                    years(incremental_payback),
                    if current.meets_target {
                        "; target met"
                    } else {
                        ""
                    }
                ),
            ),
        };

        debug!(
            model = %battery.model_name,
            quantity,
            ?decision,
            reason = %reason,
            "marginal step"
        );

        steps.push(MarginalStep {
            quantity,
            total_capacity_kwh: spec.capacity_kwh,
            total_power_kw: spec.max_power_kw,
            total_peak_reduction_kw: current.total_peak_reduction_kw,
            peak_reduction_kw: current.peak_reduction_kw,
            total_annual_savings: current.total_annual_savings,
            total_system_cost: current.total_system_cost,
            incremental_savings,
            incremental_cost,
            incremental_payback,
            meets_target: current.meets_target,
            decision,
            reason,
        });

        if decision == Decision::Reject {
            break;
        }
        accepted = Some((quantity, current));
        previous = current;
    }

    let (optimal_quantity, best) = accepted.unwrap_or_default();
    let unit = battery.spec_for(optimal_quantity);
    let summary = MarginalSummary {
        optimal_quantity,
        total_capacity_kwh: unit.capacity_kwh,
        total_power_kw: unit.max_power_kw,
        total_system_cost: best.total_system_cost,
        total_annual_savings: best.total_annual_savings,
        total_peak_reduction_kw: best.total_peak_reduction_kw,
        peak_reduction_kw: best.peak_reduction_kw,
        payback_years: guarded_ratio(best.total_system_cost, best.total_annual_savings),
        meets_target: best.meets_target,
        value_score: if best.total_system_cost > 0.0 {
            best.total_annual_savings / best.total_system_cost
        } else {
            0.0
        },
        stop_reason,
    };

    Ok(MarginalAnalysis {
        model_name: battery.model_name.clone(),
        manufacturer: battery.manufacturer.clone(),
        degradation_rate: battery.spec.degradation_rate,
        steps,
        summary,
    })
}

/// Nameplate capacity whose usable window holds the worst event's energy.
fn minimum_capacity_kwh(unit: &BatterySpec, requirements: &Requirements) -> f64 {
    let usable_fraction = guarded_ratio(unit.usable_kwh(), unit.capacity_kwh);
    guarded_ratio(requirements.min_energy_kwh, usable_fraction)
}

fn evaluate(
    profile: &LoadProfile,
    spec: &BatterySpec,
    demand_rate: f64,
    requirements: &Requirements,
    config: &EngineConfig,
) -> Result<Evaluation, InputError> {
    let months = profile.month_count();
    let annual_peak = profile.peak_kw();

    let (total_peak_reduction_kw, peak_reduction_kw, meets_target) = match config.marginal.method
    {
        ReductionMethod::GuaranteedCap => {
            let caps =
                compute_cap_discovery_across_months(profile, spec, demand_rate, &config.search)?;
            let reduction = (annual_peak - caps.guaranteed_cap_kw).max(0.0);
            (
                caps.total_reduction_kw_months(),
                reduction,
                holds_every_month(profile, spec, requirements.target_threshold_kw)?,
            )
        }
        ReductionMethod::FixedThreshold => {
            let result = simulate(profile, spec, requirements.target_threshold_kw)?;
            (
                monthly_peak_reductions(profile, &result).values().sum(),
                result.peak_reduction_kw(),
                result.holds_threshold(FEASIBILITY_EPSILON_KW),
            )
        }
    };

    Ok(Evaluation {
        total_peak_reduction_kw,
        peak_reduction_kw,
        total_annual_savings: annualized_savings(total_peak_reduction_kw, demand_rate, months),
        total_system_cost: 0.0,
        meets_target,
    })
}

/// Whether `spec` holds `threshold_kw` in every calendar month, each month
/// simulated on its own as cap discovery does.
fn holds_every_month(
    profile: &LoadProfile,
    spec: &BatterySpec,
    threshold_kw: f64,
) -> Result<bool, InputError> {
    for (_, month) in profile.months() {
        if !simulate(&month, spec, threshold_kw)?.holds_threshold(FEASIBILITY_EPSILON_KW) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Formats a payback, spelling out an infinite one.
pub(crate) fn years(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.1} yr")
    } else {
        "never".to_string()
    }
}
