use crate::battery::BatterySpec;
use crate::error::{InputError, non_negative};
use crate::profile::LoadProfile;

use super::types::SimulationResult;

/// Starting state of charge as a fraction of the usable window.
pub const INITIAL_SOC_FRACTION: f64 = 0.5;

/// Tolerance used when checking whether a dispatched peak holds a threshold.
pub const FEASIBILITY_EPSILON_KW: f64 = 1e-6;

/// Runs the flat-threshold peak-shaving dispatch over `profile`.
///
/// The battery starts half-way through its usable window and walks the series
/// in order:
/// - above `threshold_kw` it discharges `min(load − threshold, max power,
///   available energy / Δt)`;
/// - at or below it, it charges `min(threshold − load, max power,
///   headroom / Δt / efficiency)`, so charging never lifts the load over the
///   threshold.
///
/// Efficiency loss is booked on the charge leg only: a kWh drawn from the grid
/// stores `efficiency` kWh, and a stored kWh delivers a full kWh.
///
/// The function is pure: identical inputs give bit-identical results.
///
/// # Errors
///
/// Returns an [`InputError`] for an invalid battery or a negative or
/// non-finite threshold.
///
/// # Examples
///
/// ```
/// use bess_sizing::battery::BatterySpec;
/// use bess_sizing::profile::LoadProfile;
/// use bess_sizing::sim::simulate;
/// use chrono::NaiveDate;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let profile = LoadProfile::from_kw(start, 60, &[50.0, 50.0, 90.0, 50.0]).unwrap();
/// let result = simulate(&profile, &BatterySpec::new(40.0, 20.0, 0.9), 80.0).unwrap();
/// assert_eq!(result.new_peak_kw, 80.0);
/// ```
pub fn simulate(
    profile: &LoadProfile,
    spec: &BatterySpec,
    threshold_kw: f64,
) -> Result<SimulationResult, InputError> {
    spec.validate()?;
    non_negative(threshold_kw, InputError::InvalidThreshold)?;

    let dt = profile.interval_hours();
    let floor = spec.floor_kwh();
    let ceiling = spec.ceiling_kwh();
    let efficiency = spec.round_trip_efficiency;

    let mut soc = floor + spec.usable_kwh() * INITIAL_SOC_FRACTION;
    let mut net_load_kw = Vec::with_capacity(profile.len());
    let mut soc_history_kwh = Vec::with_capacity(profile.len());
    let mut energy_charged_kwh = 0.0;
    let mut energy_discharged_kwh = 0.0;
    let mut savings_kwh = 0.0;
    let mut original_peak_kw = f64::NEG_INFINITY;
    let mut new_peak_kw = f64::NEG_INFINITY;

    for load in profile.kw() {
        let new_load = if load > threshold_kw {
            // Discharge: limited by excess, power rating and stored energy.
            let available_kw = (soc - floor).max(0.0) / dt;
            let discharge_kw = (load - threshold_kw).min(spec.max_power_kw).min(available_kw);
            soc = (soc - discharge_kw * dt).max(floor);
            energy_discharged_kwh += discharge_kw * dt;
            load - discharge_kw
        } else {
            // Charge: limited by threshold headroom, power rating and free capacity.
            let headroom_kw = (ceiling - soc).max(0.0) / dt / efficiency;
            let charge_kw = (threshold_kw - load).min(spec.max_power_kw).min(headroom_kw);
            soc = (soc + charge_kw * dt * efficiency).min(ceiling);
            energy_charged_kwh += charge_kw * dt;
            load + charge_kw
        };

        savings_kwh += (load - new_load).max(0.0) * dt;
        original_peak_kw = original_peak_kw.max(load);
        new_peak_kw = new_peak_kw.max(new_load);
        net_load_kw.push(new_load);
        soc_history_kwh.push(soc);
    }

    Ok(SimulationResult {
        threshold_kw,
        interval_hours: dt,
        original_peak_kw,
        new_peak_kw,
        energy_charged_kwh,
        energy_discharged_kwh,
        savings_kwh,
        net_load_kw,
        soc_history_kwh,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    fn hourly(kw: &[f64]) -> LoadProfile {
        LoadProfile::from_kw(start(), 60, kw).expect("valid profile")
    }

    #[test]
    fn discharge_power_limit() {
        // 10 kW battery cannot shave a 30 kW excess down to the threshold.
        let profile = hourly(&[50.0, 80.0]);
        let spec = BatterySpec::new(100.0, 10.0, 1.0);
        let r = simulate(&profile, &spec, 50.0).unwrap();
        assert_eq!(r.net_load_kw[1], 70.0);
        assert_eq!(r.new_peak_kw, 70.0);
    }

    #[test]
    fn discharge_energy_limit() {
        // 20 kWh battery starts at 10 kWh; 2 h of 10 kW excess exhausts it.
        let profile = hourly(&[60.0, 60.0, 60.0]);
        let spec = BatterySpec::new(20.0, 50.0, 1.0);
        let r = simulate(&profile, &spec, 50.0).unwrap();
        assert_eq!(r.net_load_kw, vec![50.0, 60.0, 60.0]);
        assert_eq!(r.soc_history_kwh, vec![0.0, 0.0, 0.0]);
        assert_eq!(r.energy_discharged_kwh, 10.0);
    }

    #[test]
    fn charge_never_exceeds_threshold() {
        let profile = hourly(&[10.0, 20.0, 30.0]);
        let spec = BatterySpec::new(1000.0, 500.0, 0.9);
        let r = simulate(&profile, &spec, 25.0).unwrap();
        assert!(r.net_load_kw.iter().all(|&kw| kw <= 30.0));
        assert_eq!(r.net_load_kw[0], 25.0);
        assert_eq!(r.net_load_kw[1], 25.0);
    }

    #[test]
    fn efficiency_applied_on_charge_only() {
        // Empty headroom of 10 kWh at 0.5 efficiency needs 20 kWh from the grid.
        let profile = hourly(&[0.0, 0.0]);
        let spec = BatterySpec::new(20.0, 100.0, 0.5);
        let r = simulate(&profile, &spec, 100.0).unwrap();
        assert!((r.energy_charged_kwh - 20.0).abs() < 1e-9);
        assert!((r.soc_history_kwh[0] - 20.0).abs() < 1e-9);

        // A stored kWh delivers a full kWh.
        let profile = hourly(&[60.0, 60.0]);
        let spec = BatterySpec::new(20.0, 100.0, 0.5);
        let r = simulate(&profile, &spec, 50.0).unwrap();
        assert!((r.soc_history_kwh[0] - 0.0).abs() < 1e-9);
        assert!((r.energy_discharged_kwh - 10.0).abs() < 1e-9);
    }

    #[test]
    fn soc_window_is_respected() {
        let profile = hourly(&[0.0, 0.0, 200.0, 200.0, 200.0]);
        let spec = BatterySpec::new(100.0, 100.0, 1.0).with_soc_window(0.2, 0.8);
        let r = simulate(&profile, &spec, 100.0).unwrap();
        for &soc in &r.soc_history_kwh {
            assert!((20.0 - 1e-9..=80.0 + 1e-9).contains(&soc), "soc {soc}");
        }
        assert!((r.soc_history_kwh[1] - 80.0).abs() < 1e-9);
        assert!((r.soc_history_kwh[4] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn savings_counts_shaved_energy() {
        let profile = hourly(&[100.0, 100.0]);
        let spec = BatterySpec::new(100.0, 100.0, 1.0);
        let r = simulate(&profile, &spec, 80.0).unwrap();
        assert!((r.savings_kwh - 40.0).abs() < 1e-9);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let profile = hourly(&[10.0, 20.0]);
        let spec = BatterySpec::new(10.0, 5.0, 0.9);
        assert_eq!(
            simulate(&profile, &spec, -1.0),
            Err(InputError::InvalidThreshold(-1.0))
        );
        assert!(simulate(&profile, &spec, f64::NAN).is_err());
    }

    #[test]
    fn zero_threshold_is_shave_to_zero() {
        let profile = hourly(&[5.0, 5.0]);
        let spec = BatterySpec::new(100.0, 10.0, 0.9);
        let r = simulate(&profile, &spec, 0.0).unwrap();
        assert_eq!(r.new_peak_kw, 0.0);
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let profile = hourly(&[10.0, 20.0]);
        let spec = BatterySpec::new(10.0, 5.0, 1.5);
        assert_eq!(
            simulate(&profile, &spec, 15.0),
            Err(InputError::InvalidEfficiency(1.5))
        );
    }

    #[test]
    fn idle_and_negative_loads_are_handled() {
        let profile = hourly(&[-5.0, 0.0, 40.0]);
        let spec = BatterySpec::new(10.0, 5.0, 0.9);
        let r = simulate(&profile, &spec, 30.0).unwrap();
        assert_eq!(r.original_peak_kw, 40.0);
        assert_eq!(r.net_load_kw.len(), 3);
        assert_eq!(r.net_load_kw[0], 0.0);
    }
}
