//! Demand-charge bills under a time-of-use schedule.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::InputError;
use crate::profile::{LoadProfile, MonthKey};

use super::schedule::RateSchedule;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodCharge {
    pub period: String,
    /// Highest interval of the period within the month (kW).
    pub peak_kw: f64,
    pub charge: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyDemandCharge {
    pub month: MonthKey,
    pub facility_peak_kw: f64,
    pub facility_charge: f64,
    /// One entry per period that has intervals in the month, in schedule order.
    pub periods: Vec<PeriodCharge>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandChargeBill {
    pub schedule_name: String,
    pub months: Vec<MonthlyDemandCharge>,
    pub total: f64,
}

/// Bills `net_load_kw`, aligned with `profile`'s timestamps, under `schedule`.
///
/// Each month pays the facility charge on its highest interval plus, for every
/// period, that period's charge on its highest interval. Negative peaks bill
/// as zero.
///
/// # Errors
///
/// Returns an [`InputError`] if the schedule is invalid or the series length
/// differs from the profile.
pub fn compute_demand_charges(
    profile: &LoadProfile,
    net_load_kw: &[f64],
    schedule: &RateSchedule,
) -> Result<DemandChargeBill, InputError> {
    schedule.validate()?;
    if net_load_kw.len() != profile.len() {
        return Err(InputError::SeriesLengthMismatch {
            expected: profile.len(),
            actual: net_load_kw.len(),
        });
    }

    // month -> (facility peak, per-period peaks indexed like `schedule.periods`)
    let mut peaks: BTreeMap<MonthKey, (f64, Vec<Option<f64>>)> = BTreeMap::new();
    for (interval, &kw) in profile.intervals().iter().zip(net_load_kw) {
        let (facility, by_period) = peaks
            .entry(MonthKey::of(&interval.timestamp))
            .or_insert_with(|| (f64::NEG_INFINITY, vec![None; schedule.periods.len()]));
        *facility = facility.max(kw);
        if let Some(index) = schedule
            .periods
            .iter()
            .position(|p| p.contains(&interval.timestamp))
        {
            let slot = &mut by_period[index];
            *slot = Some(slot.map_or(kw, |peak| peak.max(kw)));
        }
    }

    let months: Vec<MonthlyDemandCharge> = peaks
        .into_iter()
        .map(|(month, (facility_peak_kw, by_period))| {
            let facility_charge = facility_peak_kw.max(0.0) * schedule.facility_demand_charge_per_kw;
            let periods: Vec<PeriodCharge> = schedule
                .periods
                .iter()
                .zip(by_period)
                .filter_map(|(period, peak)| {
                    peak.map(|peak_kw| PeriodCharge {
                        period: period.name.clone(),
                        peak_kw,
                        charge: peak_kw.max(0.0) * period.demand_charge_per_kw,
                    })
                })
                .collect();
            let total = facility_charge + periods.iter().map(|p| p.charge).sum::<f64>();
            MonthlyDemandCharge {
                month,
                facility_peak_kw,
                facility_charge,
                periods,
                total,
            }
        })
        .collect();

    Ok(DemandChargeBill {
        schedule_name: schedule.name.clone(),
        total: months.iter().map(|m| m.total).sum(),
        months,
    })
}
