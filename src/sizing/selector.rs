//! Catalog-wide battery selection.
//!
//! Derives the facility's peak profile and physical requirements once, runs
//! the marginal analysis for every catalog entry in parallel, gates and grades
//! the results and ranks the survivors.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::battery::CatalogBattery;
use crate::config::EngineConfig;
use crate::error::{InputError, non_negative};
use crate::profile::{LoadProfile, MonthKey};
use crate::sim::events::{PeakEventSummary, detect_peak_events, summarize_peak_events};

use super::economics::{EconomicGrade, EconomicsGrader};
use super::marginal::{MarginalAnalysis, StopReason, analyze_marginal_portfolio};

/// Shape of the facility's demand, computed once per selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakProfile {
    pub peak_kw: f64,
    pub peak_time: NaiveDateTime,
    pub average_kw: f64,
    pub load_factor: f64,
    pub interval_hours: f64,
    pub interval_count: usize,
    pub monthly_peaks: BTreeMap<MonthKey, f64>,
    /// Events above the target threshold.
    pub events: PeakEventSummary,
}

impl PeakProfile {
    pub fn derive(profile: &LoadProfile, target_threshold_kw: f64) -> Self {
        let events = detect_peak_events(profile, target_threshold_kw);
        Self {
            peak_kw: profile.peak_kw(),
            peak_time: profile.intervals()[profile.peak_index()].timestamp,
            average_kw: profile.average_kw(),
            load_factor: profile.load_factor(),
            interval_hours: profile.interval_hours(),
            interval_count: profile.len(),
            monthly_peaks: profile.monthly_peaks(),
            events: summarize_peak_events(&events, profile.interval_hours()),
        }
    }
}

/// Minimum physical battery that shaves the target off the worst event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Requirements {
    pub target_reduction_percent: f64,
    pub target_reduction_kw: f64,
    /// Raw peak minus the target reduction (kW).
    pub target_threshold_kw: f64,
    pub min_power_kw: f64,
    /// Energy above the threshold in the most energetic event (kWh).
    pub min_energy_kwh: f64,
    pub worst_event_duration_hours: f64,
}

impl Requirements {
    /// Requirements for cutting `target_reduction_percent` off the raw peak.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidTargetReduction`] unless the target lies
    /// strictly between 0 and 100.
    pub fn derive(profile: &LoadProfile, target_reduction_percent: f64) -> Result<Self, InputError> {
        if !(target_reduction_percent > 0.0 && target_reduction_percent < 100.0) {
            return Err(InputError::InvalidTargetReduction(target_reduction_percent));
        }
        let peak = profile.peak_kw();
        let target_reduction_kw = peak.max(0.0) * target_reduction_percent / 100.0;
        let target_threshold_kw = peak - target_reduction_kw;
        let events = detect_peak_events(profile, target_threshold_kw);
        let summary = summarize_peak_events(&events, profile.interval_hours());
        Ok(Self {
            target_reduction_percent,
            target_reduction_kw,
            target_threshold_kw,
            min_power_kw: target_reduction_kw,
            min_energy_kwh: summary.max_event_energy_kwh,
            worst_event_duration_hours: summary.longest_duration_hours,
        })
    }
}

/// A ranked portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub model_name: String,
    pub manufacturer: String,
    pub quantity: u32,
    pub total_capacity_kwh: f64,
    pub total_power_kw: f64,
    pub system_cost: f64,
    pub annual_savings: f64,
    pub payback_years: f64,
    pub peak_reduction_kw: f64,
    pub meets_target: bool,
    pub stop_reason: StopReason,
    pub grade: EconomicGrade,
    /// False for best-effort candidates that skipped the gates.
    pub meets_strict_gates: bool,
}

impl Candidate {
    fn from_analysis(
        analysis: &MarginalAnalysis,
        grader: &dyn EconomicsGrader,
        config: &EngineConfig,
        meets_strict_gates: bool,
    ) -> Self {
        let s = &analysis.summary;
        let assumptions = config
            .economics
            .with_min_degradation(analysis.degradation_rate);
        Self {
            model_name: analysis.model_name.clone(),
            manufacturer: analysis.manufacturer.clone(),
            quantity: s.optimal_quantity,
            total_capacity_kwh: s.total_capacity_kwh,
            total_power_kw: s.total_power_kw,
            system_cost: s.total_system_cost,
            annual_savings: s.total_annual_savings,
            payback_years: s.payback_years,
            peak_reduction_kw: s.peak_reduction_kw,
            meets_target: s.meets_target,
            stop_reason: s.stop_reason,
            grade: grader.grade(s.total_system_cost, s.total_annual_savings, &assumptions),
            meets_strict_gates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub peak_profile: PeakProfile,
    pub requirements: Requirements,
    /// Gate-passing portfolios, best first, at most `selection.top_k`.
    pub candidates: Vec<Candidate>,
    /// One analysis per valid catalog entry, in catalog order.
    pub marginal_analysis: Vec<MarginalAnalysis>,
    /// Catalog entries that were analyzed. Invalid entries are skipped
    /// before analysis, are not counted here, and get a `skipped` log line.
    pub batteries_evaluated: usize,
    pub batteries_passed: usize,
    /// Human-readable decision trail.
    pub log: Vec<String>,
}

/// Fallback ranking for when nothing passed the gates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestEffortSelection {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<String>,
}

impl SelectionResult {
    /// Ranks every analysis that accepted at least one unit by value score,
    /// ignoring the target and payback gates.
    ///
    /// Returns `None` when strict candidates exist or no battery accepted a
    /// single unit. Every returned candidate has `meets_strict_gates = false`
    /// and each missed gate is named in `warnings`.
    pub fn best_effort(
        &self,
        grader: &dyn EconomicsGrader,
        config: &EngineConfig,
    ) -> Option<BestEffortSelection> {
        if !self.candidates.is_empty() {
            return None;
        }
        let mut pool: Vec<&MarginalAnalysis> = self
            .marginal_analysis
            .iter()
            .filter(|a| a.summary.optimal_quantity >= 1)
            .collect();
        if pool.is_empty() {
            return None;
        }
        pool.sort_by(|a, b| {
            b.summary
                .value_score
                .total_cmp(&a.summary.value_score)
                .then_with(|| a.summary.total_system_cost.total_cmp(&b.summary.total_system_cost))
        });
        pool.truncate(config.selection.top_k);

        let mut warnings = vec![
            "no battery met every selection gate; these portfolios are the best available"
                .to_string(),
        ];
        let candidates = pool
            .into_iter()
            .map(|analysis| {
                let s = &analysis.summary;
                if !s.meets_target {
                    warnings.push(format!(
                        "{}: reaches {:.1} kW of the {:.1} kW target reduction",
                        analysis.model_name,
                        s.peak_reduction_kw,
                        self.requirements.target_reduction_kw
                    ));
                }
                if s.payback_years > config.selection.max_payback_years {
                    warnings.push(format!(
                        "{}: payback {:.1} yr exceeds {:.1} yr",
                        analysis.model_name, s.payback_years, config.selection.max_payback_years
                    ));
                }
                Candidate::from_analysis(analysis, grader, config, false)
            })
            .collect();

        Some(BestEffortSelection {
            candidates,
            warnings,
        })
    }
}

/// Picks the best battery portfolios from `catalog` for cutting
/// `target_reduction_percent` off the facility's billed peak.
///
/// Marginal analyses run in parallel and are kept in catalog order. Invalid
/// catalog entries are skipped with a log line. A portfolio passes when it
/// accepted at least one unit, meets the target and pays back within
/// `selection.max_payback_years`; passers are graded by `grader`, ranked by
/// score (ties go to the cheaper system) and cut to `selection.top_k`.
///
/// An empty catalog, or one where nothing passes, is not an error: the result
/// has no candidates and the log says why.
///
/// # Errors
///
/// Returns an [`InputError`] for an invalid demand rate or target.
pub fn select_optimal_batteries(
    profile: &LoadProfile,
    catalog: &[CatalogBattery],
    demand_rate: f64,
    target_reduction_percent: f64,
    config: &EngineConfig,
    grader: &dyn EconomicsGrader,
) -> Result<SelectionResult, InputError> {
    non_negative(demand_rate, InputError::InvalidDemandRate)?;
    let requirements = Requirements::derive(profile, target_reduction_percent)?;
    let peak_profile = PeakProfile::derive(profile, requirements.target_threshold_kw);

    let mut log = vec![format!(
        "target {:.1}% = {:.1} kW off a {:.1} kW peak (threshold {:.1} kW); worst event \
         {:.2} h, {:.1} kWh above threshold ({})",
        requirements.target_reduction_percent,
        requirements.target_reduction_kw,
        peak_profile.peak_kw,
        requirements.target_threshold_kw,
        requirements.worst_event_duration_hours,
        requirements.min_energy_kwh,
        peak_profile.events.pattern,
    )];

    if catalog.is_empty() {
        log.push("catalog is empty: no batteries to evaluate".to_string());
        info!("selection skipped: empty catalog");
        return Ok(SelectionResult {
            peak_profile,
            requirements,
            candidates: Vec::new(),
            marginal_analysis: Vec::new(),
            batteries_evaluated: 0,
            batteries_passed: 0,
            log,
        });
    }

    let outcomes: Vec<Result<MarginalAnalysis, InputError>> = catalog
        .par_iter()
        .map(|battery| {
            analyze_marginal_portfolio(profile, battery, demand_rate, &requirements, config)
        })
        .collect();

    let max_payback = config.selection.max_payback_years;
    let mut marginal_analysis = Vec::with_capacity(outcomes.len());
    let mut candidates = Vec::new();
    for (battery, outcome) in catalog.iter().zip(outcomes) {
        let analysis = match outcome {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(model = %battery.model_name, error = %e, "skipping catalog entry");
                log.push(format!("{}: skipped, {e}", battery.model_name));
                continue;
            }
        };

        let s = &analysis.summary;
        let verdict = if s.optimal_quantity == 0 {
            Err("no unit accepted")
        } else if !s.meets_target {
            Err("misses the target reduction")
        } else if s.payback_years > max_payback {
            Err("payback above the selection limit")
        } else {
            Ok(())
        };

        log.push(match verdict {
            Ok(()) => format!(
                "{}: {} unit(s), {:.1} kW reduction, {:.1} yr payback; stopped on {}; passed",
                analysis.model_name,
                s.optimal_quantity,
                s.peak_reduction_kw,
                s.payback_years,
                s.stop_reason
            ),
            Err(why) => format!(
                "{}: {} unit(s); stopped on {}; rejected, {why}",
                analysis.model_name, s.optimal_quantity, s.stop_reason
            ),
        });
        debug!(model = %analysis.model_name, passed = verdict.is_ok(), "battery evaluated");

        if verdict.is_ok() {
            candidates.push(Candidate::from_analysis(&analysis, grader, config, true));
        }
        marginal_analysis.push(analysis);
    }

    let batteries_passed = candidates.len();
    candidates.sort_by(rank);
    candidates.truncate(config.selection.top_k);
    if candidates.is_empty() {
        log.push("no battery passed every gate; a best-effort ranking is available".to_string());
    }

    info!(
        evaluated = marginal_analysis.len(),
        passed = batteries_passed,
        returned = candidates.len(),
        "battery selection finished"
    );

    Ok(SelectionResult {
        peak_profile,
        requirements,
        candidates,
        batteries_evaluated: marginal_analysis.len(),
        batteries_passed,
        marginal_analysis,
        log,
    })
}

/// Score descending, then cheaper first.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.grade
        .economic_score
        .total_cmp(&a.grade.economic_score)
        .then_with(|| a.system_cost.total_cmp(&b.system_cost))
}
