//! Human-readable reports for the CLI.
//!
//! Every report is a `Display` impl on the result type it renders, so the
//! binary only has to `println!` what the engine returned.

use std::fmt;

use crate::sizing::marginal::years;
use crate::sizing::{
    BestEffortSelection, CapDiscoveryResult, Candidate, Decision, MarginalAnalysis,
    SelectionResult, ThresholdOptimization,
};
use crate::tariff::{DemandChargeBill, DispatchComparison, OptionSDispatch};

impl fmt::Display for CapDiscoveryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Cap Discovery ---")?;
        for m in &self.months {
            writeln!(
                f,
                "{}  raw {:>9.2} kW -> cap {:>9.2} kW  ({} iterations)",
                m.month, m.raw_peak_kw, m.achieved_cap_kw, m.iterations
            )?;
        }
        writeln!(f, "Guaranteed cap:        {:.2} kW", self.guaranteed_cap_kw)?;
        if let Some(month) = self.binding_month {
            writeln!(f, "Binding month:         {month}")?;
        }
        write!(f, "Annual savings:        ${:.0}", self.annual_savings)
    }
}

impl fmt::Display for ThresholdOptimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Threshold Optimization ---")?;
        writeln!(f, "Optimal threshold:     {:.2} kW", self.optimal_threshold_kw)?;
        writeln!(
            f,
            "Peak reduction:        {:.1}% ({:.2} kW/month billed)",
            self.peak_reduction_percent, self.monthly_peak_reduction_kw
        )?;
        writeln!(f, "Annual savings:        ${:.0}", self.annual_savings)?;
        writeln!(f, "Payback:               {}", years(self.payback_years))?;
        if !self.within_bounds {
            writeln!(f, "Note: no threshold met the payback band; closest shown")?;
        }
        write!(f, "Candidates evaluated:  {}", self.candidates_evaluated)
    }
}

impl fmt::Display for MarginalAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.model_name, self.manufacturer)?;
        for s in &self.steps {
            let mark = match s.decision {
                Decision::Accept => "ACCEPT",
                Decision::Reject => "REJECT",
            };
            writeln!(
                f,
                "  q={:<3} {mark}  {:>8.1} kWh {:>7.1} kW  ${:>10.0}/yr  ${:>11.0}  {}",
                s.quantity,
                s.total_capacity_kwh,
                s.total_power_kw,
                s.total_annual_savings,
                s.total_system_cost,
                s.reason
            )?;
        }
        let s = &self.summary;
        write!(
            f,
            "  -> {} unit(s), payback {}, stopped on {}",
            s.optimal_quantity,
            years(s.payback_years),
            s.stop_reason
        )
    }
}

fn write_candidates(f: &mut fmt::Formatter<'_>, candidates: &[Candidate]) -> fmt::Result {
    for (rank, c) in candidates.iter().enumerate() {
        writeln!(
            f,
            "{:>2}. {} x{}  {:.0} kWh / {:.0} kW  cost ${:.0}  savings ${:.0}/yr  \
             payback {}  NPV ${:.0}  score {:.1}",
            rank + 1,
            c.model_name,
            c.quantity,
            c.total_capacity_kwh,
            c.total_power_kw,
            c.system_cost,
            c.annual_savings,
            years(c.payback_years),
            c.grade.financial.net_present_value,
            c.grade.economic_score
        )?;
    }
    Ok(())
}

impl fmt::Display for SelectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.peak_profile;
        let r = &self.requirements;
        writeln!(f, "--- Battery Selection ---")?;
        writeln!(
            f,
            "Peak:                  {:.2} kW at {} (load factor {:.2})",
            p.peak_kw, p.peak_time, p.load_factor
        )?;
        writeln!(
            f,
            "Target:                {:.1}% -> {:.2} kW threshold",
            r.target_reduction_percent, r.target_threshold_kw
        )?;
        writeln!(
            f,
            "Requirement:           {:.1} kW, {:.1} kWh over {:.2} h ({})",
            r.min_power_kw, r.min_energy_kwh, r.worst_event_duration_hours, p.events.pattern
        )?;
        writeln!(
            f,
            "Evaluated / passed:    {} / {}",
            self.batteries_evaluated, self.batteries_passed
        )?;
        write_candidates(f, &self.candidates)?;
        writeln!(f, "Log:")?;
        for line in &self.log {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BestEffortSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Best-Effort Selection (not meeting strict gates) ---")?;
        write_candidates(f, &self.candidates)?;
        for w in &self.warnings {
            writeln!(f, "warning: {w}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DemandChargeBill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.months {
            write!(f, "{}  facility {:.1} kW ${:.0}", m.month, m.facility_peak_kw, m.facility_charge)?;
            for p in &m.periods {
                write!(f, "  {} {:.1} kW ${:.0}", p.period, p.peak_kw, p.charge)?;
            }
            writeln!(f, "  = ${:.0}", m.total)?;
        }
        write!(f, "Total ({}): ${:.0}", self.schedule_name, self.total)
    }
}

impl fmt::Display for OptionSDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Exception Dispatch ({}) ---", self.schedule_name)?;
        writeln!(f, "Heuristic:             {}", self.heuristic)?;
        writeln!(
            f,
            "Peak:                  {:.2} -> {:.2} kW (threshold {:.2} kW)",
            self.original_peak_kw, self.new_peak_kw, self.threshold_kw
        )?;
        writeln!(
            f,
            "Energy:                {:.2} kWh charged, {:.2} kWh discharged",
            self.energy_charged_kwh, self.energy_discharged_kwh
        )?;
        write!(f, "Discharge windows:     {}", self.windows.len())?;
        for w in &self.warnings {
            write!(f, "\nwarning: {w}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DispatchComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.option_s)?;
        writeln!(f, "--- Demand Charges ---")?;
        writeln!(f, "Baseline:              ${:.0}", self.baseline_bill.total)?;
        writeln!(f, "Flat threshold:        ${:.0}", self.flat_threshold_bill.total)?;
        writeln!(f, "Exception dispatch:    ${:.0}", self.option_s_bill.total)?;
        write!(
            f,
            "Better path:           {} (saves ${:.0} vs baseline)",
            self.better,
            self.savings()
        )
    }
}
