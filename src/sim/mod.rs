/// Monthly billing-peak arithmetic.
pub mod billing;
/// Above-threshold event detection and pattern classification.
pub mod events;
pub mod kpi;
/// Flat-threshold battery dispatch simulator.
pub mod simulator;
pub mod types;

pub use events::{PeakEvent, PeakEventSummary, PeakPattern, detect_peak_events, summarize_peak_events};
pub use simulator::simulate;
pub use types::SimulationResult;
