/// Per-month guaranteed demand cap search.
pub mod cap_discovery;
pub mod economics;
/// Quantity growth with a diminishing-returns stopping rule.
pub mod marginal;
pub mod selector;
/// Payback-bounded threshold search.
pub mod threshold;

pub use cap_discovery::{CapDiscoveryResult, MonthCap, compute_cap_discovery_across_months};
pub use economics::{EconomicAssumptions, EconomicGrade, EconomicsGrader, NpvGrader};
pub use marginal::{
    Decision, MarginalAnalysis, MarginalStep, MarginalSummary, StopReason,
    analyze_marginal_portfolio,
};
pub use selector::{
    BestEffortSelection, Candidate, PeakProfile, Requirements, SelectionResult,
    select_optimal_batteries,
};
pub use threshold::{ThresholdOptimization, optimize_threshold_for_value};
