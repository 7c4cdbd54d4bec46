/// Monthly demand-charge bills per time-of-use period.
pub mod billing;
pub mod option_s;
/// Rate schedules and their time-of-use windows.
pub mod schedule;

pub use billing::{DemandChargeBill, MonthlyDemandCharge, PeriodCharge, compute_demand_charges};
pub use option_s::{
    DispatchComparison, DispatchMode, DispatchPath, Heuristic, OptionSDispatch, WindowPlan,
    compare_dispatch_paths, run_option_s_dispatch,
};
pub use schedule::{OPTION_S, PeriodKind, RateSchedule, TouPeriod, TouWindow};
