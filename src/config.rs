//! TOML-based engine configuration and preset definitions.
//!
//! Every search tolerance, iteration budget, multiplier and payback bound the
//! sizing engine uses lives here, so a run is reproducible from one file.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sizing::economics::EconomicAssumptions;

/// Top-level engine configuration parsed from TOML.
///
/// All fields have defaults matching the `default` preset. Load from TOML with
/// [`EngineConfig::from_toml_file`] or use [`EngineConfig::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Binary/grid search budgets.
    #[serde(default)]
    pub search: SearchConfig,
    /// Payback band and threshold floor for the threshold optimizer.
    #[serde(default)]
    pub threshold: ThresholdBounds,
    /// Stopping rule of the marginal portfolio analyzer.
    #[serde(default)]
    pub marginal: MarginalConfig,
    /// Candidate gates and ranking.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Assumptions handed to the economics grader.
    #[serde(default)]
    pub economics: EconomicAssumptions,
}

/// Binary/grid search budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Cap discovery stops once the bracket is this narrow (kW).
    pub tolerance_kw: f64,
    /// Cap discovery iteration budget per month.
    pub max_iterations: u32,
    /// Threshold optimizer grid resolution (candidates = steps + 1).
    pub threshold_grid_steps: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance_kw: 0.1,
            max_iterations: 40,
            threshold_grid_steps: 40,
        }
    }
}

/// Bounds for [`crate::sizing::optimize_threshold_for_value`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdBounds {
    /// Shortest acceptable simple payback (years).
    pub min_payback_years: f64,
    /// Longest acceptable simple payback (years).
    pub max_payback_years: f64,
    /// Lowest threshold searched, as a percentage of the raw peak.
    pub min_threshold_percent: f64,
}

impl Default for ThresholdBounds {
    fn default() -> Self {
        Self {
            min_payback_years: 0.0,
            max_payback_years: 10.0,
            min_threshold_percent: 50.0,
        }
    }
}

/// How the marginal analyzer measures the peak reduction of a portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMethod {
    /// Per-month cap discovery: what the battery can guarantee in every month.
    GuaranteedCap,
    /// One simulation at the target threshold.
    FixedThreshold,
}

/// Stopping rule of the marginal portfolio analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarginalConfig {
    /// Reject a unit whose own payback exceeds this (years).
    pub max_incremental_payback_years: f64,
    /// Reject once capacity exceeds this multiple of the minimum needed.
    pub oversize_multiplier: f64,
    /// Once the target is met, reject units adding less than this ($/year).
    pub min_incremental_savings: f64,
    /// Hard quantity ceiling.
    pub max_quantity: u32,
    /// Peak-reduction measure.
    pub method: ReductionMethod,
}

impl Default for MarginalConfig {
    fn default() -> Self {
        Self {
            max_incremental_payback_years: 15.0,
            oversize_multiplier: 2.0,
            min_incremental_savings: 1_000.0,
            max_quantity: 20,
            method: ReductionMethod::GuaranteedCap,
        }
    }
}

/// Candidate gates and ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    /// Number of ranked candidates returned.
    pub top_k: usize,
    /// Portfolios paying back slower than this fail the gate (years).
    pub max_payback_years: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_payback_years: 15.0,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"search.tolerance_kw"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Returns the strict preset: short paybacks, little oversizing.
    pub fn strict() -> Self {
        Self {
            threshold: ThresholdBounds {
                max_payback_years: 7.0,
                ..ThresholdBounds::default()
            },
            marginal: MarginalConfig {
                max_incremental_payback_years: 10.0,
                oversize_multiplier: 1.5,
                min_incremental_savings: 2_500.0,
                ..MarginalConfig::default()
            },
            selection: SelectionConfig {
                max_payback_years: 10.0,
                ..SelectionConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the lenient preset: long paybacks, generous oversizing.
    pub fn lenient() -> Self {
        Self {
            threshold: ThresholdBounds {
                max_payback_years: 15.0,
                min_threshold_percent: 30.0,
                ..ThresholdBounds::default()
            },
            marginal: MarginalConfig {
                max_incremental_payback_years: 25.0,
                oversize_multiplier: 3.0,
                min_incremental_savings: 250.0,
                max_quantity: 40,
                ..MarginalConfig::default()
            },
            selection: SelectionConfig {
                max_payback_years: 25.0,
                top_k: 10,
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["default", "strict", "lenient"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default()),
            "strict" => Ok(Self::strict()),
            "lenient" => Ok(Self::lenient()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        let s = &self.search;
        check(s.tolerance_kw > 0.0, "search.tolerance_kw", "must be > 0");
        check(s.max_iterations > 0, "search.max_iterations", "must be > 0");
        check(
            s.threshold_grid_steps > 0,
            "search.threshold_grid_steps",
            "must be > 0",
        );

        let t = &self.threshold;
        check(
            t.min_payback_years >= 0.0,
            "threshold.min_payback_years",
            "must be >= 0",
        );
        check(
            t.max_payback_years > t.min_payback_years,
            "threshold.max_payback_years",
            "must be > threshold.min_payback_years",
        );
        check(
            (0.0..100.0).contains(&t.min_threshold_percent),
            "threshold.min_threshold_percent",
            "must be in [0, 100)",
        );

        let m = &self.marginal;
        check(
            m.max_incremental_payback_years > 0.0,
            "marginal.max_incremental_payback_years",
            "must be > 0",
        );
        check(
            m.oversize_multiplier >= 1.0,
            "marginal.oversize_multiplier",
            "must be >= 1",
        );
        check(
            m.min_incremental_savings >= 0.0,
            "marginal.min_incremental_savings",
            "must be >= 0",
        );
        check(m.max_quantity > 0, "marginal.max_quantity", "must be > 0");

        let sel = &self.selection;
        check(sel.top_k > 0, "selection.top_k", "must be > 0");
        check(
            sel.max_payback_years > 0.0,
            "selection.max_payback_years",
            "must be > 0",
        );

        let e = &self.economics;
        check(
            e.install_cost_multiplier >= 1.0,
            "economics.install_cost_multiplier",
            "must be >= 1",
        );
        check(
            (0.0..1.0).contains(&e.incentive_fraction),
            "economics.incentive_fraction",
            "must be in [0, 1)",
        );
        check(
            e.discount_rate > -1.0,
            "economics.discount_rate",
            "must be > -1",
        );
        check(e.analysis_years > 0, "economics.analysis_years", "must be > 0");
        check(
            e.payback_cap_years > 0.0,
            "economics.payback_cap_years",
            "must be > 0",
        );

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_valid() {
        let errors = EngineConfig::default().validate();
        assert!(errors.is_empty(), "default should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = EngineConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in EngineConfig::PRESETS {
            let cfg = EngineConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(EngineConfig::validate).unwrap_or_default();
            assert!(errors.is_empty(), "preset \"{name}\" should be valid: {errors:?}");
        }
    }

    #[test]
    fn strict_is_tighter_than_lenient() {
        let strict = EngineConfig::strict();
        let lenient = EngineConfig::lenient();
        assert!(strict.marginal.oversize_multiplier < lenient.marginal.oversize_multiplier);
        assert!(strict.selection.max_payback_years < lenient.selection.max_payback_years);
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[search]
tolerance_kw = 0.05
max_iterations = 60
threshold_grid_steps = 80

[threshold]
min_payback_years = 1.0
max_payback_years = 8.0
min_threshold_percent = 40.0

[marginal]
max_incremental_payback_years = 12.0
oversize_multiplier = 2.5
min_incremental_savings = 500.0
max_quantity = 12
method = "fixed_threshold"

[selection]
top_k = 3
max_payback_years = 12.0

[economics]
install_cost_multiplier = 1.2
incentive_fraction = 0.3
discount_rate = 0.05
analysis_years = 20
payback_cap_years = 30.0
"#;
        let cfg = EngineConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.search.max_iterations), Some(60));
        assert_eq!(
            cfg.as_ref().map(|c| c.marginal.method),
            Some(ReductionMethod::FixedThreshold)
        );
        assert_eq!(cfg.as_ref().map(|c| c.economics.analysis_years), Some(20));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[search]
tolerance_kw = 0.1
bogus_field = true
"#;
        assert!(EngineConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[marginal]
max_quantity = 5
"#;
        let cfg = EngineConfig::from_toml_str(toml).ok();
        assert_eq!(cfg.as_ref().map(|c| c.marginal.max_quantity), Some(5));
        assert_eq!(cfg.as_ref().map(|c| c.marginal.oversize_multiplier), Some(2.0));
        assert_eq!(cfg.as_ref().map(|c| c.search.max_iterations), Some(40));
    }

    #[test]
    fn validation_catches_bad_search() {
        let mut cfg = EngineConfig::default();
        cfg.search.tolerance_kw = 0.0;
        cfg.search.max_iterations = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "search.tolerance_kw"));
        assert!(errors.iter().any(|e| e.field == "search.max_iterations"));
    }

    #[test]
    fn validation_catches_inverted_payback_band() {
        let mut cfg = EngineConfig::default();
        cfg.threshold.min_payback_years = 12.0;
        cfg.threshold.max_payback_years = 5.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "threshold.max_payback_years"));
    }

    #[test]
    fn validation_catches_undersized_multiplier() {
        let mut cfg = EngineConfig::default();
        cfg.marginal.oversize_multiplier = 0.5;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "marginal.oversize_multiplier"));
    }
}
