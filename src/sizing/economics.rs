//! Economic grading of a battery portfolio.
//!
//! The selector treats grading as a black box behind [`EconomicsGrader`], so a
//! caller can swap in its own financial model. [`NpvGrader`] is the bundled one.

use serde::{Deserialize, Serialize};

use crate::error::guarded_ratio;

/// Financial assumptions shared by every graded portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomicAssumptions {
    /// Installed cost as a multiple of material cost (labor, BOS, permitting).
    pub install_cost_multiplier: f64,
    /// Fraction of installed cost recovered through incentives.
    pub incentive_fraction: f64,
    /// Annual discount rate for the NPV.
    pub discount_rate: f64,
    /// NPV horizon (years).
    pub analysis_years: u32,
    /// Paybacks are capped here before scoring (years).
    pub payback_cap_years: f64,
    /// Annual fade of savings. The selector raises it to a battery's own
    /// `degradation_rate` when that is larger.
    pub degradation_rate: f64,
}

impl Default for EconomicAssumptions {
    fn default() -> Self {
        Self {
            install_cost_multiplier: 1.3,
            incentive_fraction: 0.0,
            discount_rate: 0.07,
            analysis_years: 15,
            payback_cap_years: 25.0,
            degradation_rate: 0.0,
        }
    }
}

impl EconomicAssumptions {
    /// Copy with degradation raised to at least `rate`.
    #[must_use]
    pub fn with_min_degradation(mut self, rate: f64) -> Self {
        self.degradation_rate = self.degradation_rate.max(rate);
        self
    }

    /// Material cost turned into the net cost the owner pays.
    pub fn installed_cost(&self, material_cost: f64) -> f64 {
        material_cost * self.install_cost_multiplier * (1.0 - self.incentive_fraction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub installed_cost: f64,
    /// Installed cost over first-year savings, capped at `payback_cap_years`.
    pub adjusted_payback: f64,
    pub net_present_value: f64,
}

/// Score plus the financials it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EconomicGrade {
    /// 0..=100, higher is better.
    pub economic_score: f64,
    pub financial: FinancialSummary,
}

/// Turns a portfolio's cost and savings into a comparable grade.
pub trait EconomicsGrader {
    fn grade(
        &self,
        material_cost: f64,
        annual_savings: f64,
        assumptions: &EconomicAssumptions,
    ) -> EconomicGrade;
}

/// Payback-and-NPV grader.
///
/// Half the score rewards a short capped payback, half rewards the NPV per
/// installed dollar (clamped to ±1).
#[derive(Debug, Clone, Copy, Default)]
pub struct NpvGrader;

impl NpvGrader {
    /// Discounted savings minus installed cost, with savings fading each year.
    pub fn net_present_value(
        installed_cost: f64,
        annual_savings: f64,
        assumptions: &EconomicAssumptions,
    ) -> f64 {
        let fade = 1.0 - assumptions.degradation_rate;
        let growth = 1.0 + assumptions.discount_rate;
        let discounted: f64 = (1..=assumptions.analysis_years)
            .map(|year| {
                let year = f64::from(year);
                annual_savings * fade.powf(year - 1.0) / growth.powf(year)
            })
            .sum();
        discounted - installed_cost
    }
}

impl EconomicsGrader for NpvGrader {
    fn grade(
        &self,
        material_cost: f64,
        annual_savings: f64,
        assumptions: &EconomicAssumptions,
    ) -> EconomicGrade {
        let installed_cost = assumptions.installed_cost(material_cost);
        let cap = assumptions.payback_cap_years;
        let adjusted_payback = guarded_ratio(installed_cost, annual_savings).min(cap);
        let net_present_value = Self::net_present_value(installed_cost, annual_savings, assumptions);

        let payback_part = 50.0 * (1.0 - adjusted_payback / cap);
        let npv_part = if installed_cost > 0.0 {
            50.0 * (net_present_value / installed_cost).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        EconomicGrade {
            economic_score: (payback_part + npv_part).clamp(0.0, 100.0),
            financial: FinancialSummary {
                installed_cost,
                adjusted_payback,
                net_present_value,
            },
        }
    }
}
