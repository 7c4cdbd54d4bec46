//! Post-hoc KPI computation from a dispatch run.

use std::fmt;

use serde::Serialize;

use crate::battery::BatterySpec;

use super::types::SimulationResult;

/// Aggregate key performance indicators derived from a complete dispatch run.
///
/// Computed post-hoc from a [`SimulationResult`] so the reported metrics are
/// always consistent with the per-interval series.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchKpi {
    /// Raw peak minus dispatched peak (kW).
    pub peak_reduction_kw: f64,
    /// Peak reduction as a percentage of the raw peak.
    pub peak_reduction_pct: f64,
    /// Total battery energy throughput (kWh, charged + discharged).
    pub throughput_kwh: f64,
    /// Equivalent full cycles (throughput / 2·usable energy).
    pub equivalent_full_cycles: f64,
    /// Intervals in which the battery discharged.
    pub discharging_intervals: usize,
    /// Intervals in which the battery charged.
    pub charging_intervals: usize,
    /// Lowest stored energy reached (kWh).
    pub min_soc_kwh: f64,
    /// Round-trip energy actually lost (kWh): charged minus discharged minus net stored change.
    pub losses_kwh: f64,
}

impl DispatchKpi {
    /// Computes all KPIs from a dispatch run.
    ///
    /// # Arguments
    ///
    /// * `result` - Completed simulation
    /// * `loads_kw` - Raw load series the simulation ran on
    /// * `spec` - Battery the simulation used
    pub fn from_result(result: &SimulationResult, loads_kw: &[f64], spec: &BatterySpec) -> Self {
        let mut discharging = 0_usize;
        let mut charging = 0_usize;
        for (&load, &net) in loads_kw.iter().zip(&result.net_load_kw) {
            if net < load {
                discharging += 1;
            } else if net > load {
                charging += 1;
            }
        }

        let peak_reduction_kw = result.peak_reduction_kw();
        let peak_reduction_pct = if result.original_peak_kw > 0.0 {
            100.0 * peak_reduction_kw / result.original_peak_kw
        } else {
            0.0
        };

        let throughput_kwh = result.energy_charged_kwh + result.energy_discharged_kwh;
        let usable = spec.usable_kwh();
        let equivalent_full_cycles = if usable > 0.0 {
            throughput_kwh / (2.0 * usable)
        } else {
            0.0
        };

        let initial_soc =
            spec.floor_kwh() + usable * super::simulator::INITIAL_SOC_FRACTION;
        let final_soc = result.soc_history_kwh.last().copied().unwrap_or(initial_soc);
        let losses_kwh =
            (result.energy_charged_kwh - result.energy_discharged_kwh - (final_soc - initial_soc))
                .max(0.0);

        Self {
            peak_reduction_kw,
            peak_reduction_pct,
            throughput_kwh,
            equivalent_full_cycles,
            discharging_intervals: discharging,
            charging_intervals: charging,
            min_soc_kwh: result
                .soc_history_kwh
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min),
            losses_kwh,
        }
    }
}

impl fmt::Display for DispatchKpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Dispatch KPIs ---")?;
        writeln!(
            f,
            "Peak reduction:        {:.2} kW ({:.1}%)",
            self.peak_reduction_kw, self.peak_reduction_pct
        )?;
        writeln!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles)",
            self.throughput_kwh, self.equivalent_full_cycles
        )?;
        writeln!(
            f,
            "Active intervals:      {} discharging, {} charging",
            self.discharging_intervals, self.charging_intervals
        )?;
        writeln!(f, "Lowest stored energy:  {:.2} kWh", self.min_soc_kwh)?;
        write!(f, "Charge-leg losses:     {:.2} kWh", self.losses_kwh)
    }
}
