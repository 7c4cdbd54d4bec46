//! Time-of-use rate schedules.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Name of the bundled exception tariff.
pub const OPTION_S: &str = "option_s";

/// Role a period plays in dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    OnPeak,
    MidPeak,
    OffPeak,
    SuperOffPeak,
}

impl PeriodKind {
    pub fn allows_charging(self) -> bool {
        matches!(self, Self::OffPeak | Self::SuperOffPeak)
    }
}

/// A daily hour range, optionally limited to weekdays and some months.
///
/// `start_hour` is inclusive and `end_hour` exclusive. A window whose
/// `end_hour <= start_hour` wraps past midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TouWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default)]
    pub weekdays_only: bool,
    /// Calendar months (1..=12) the window applies in; empty means all year.
    #[serde(default)]
    pub months: Vec<u32>,
}

impl TouWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
            weekdays_only: false,
            months: Vec::new(),
        }
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        if self.weekdays_only && matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if !self.months.is_empty() && !self.months.contains(&timestamp.month()) {
            return false;
        }
        let hour = timestamp.hour();
        if self.start_hour < self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TouPeriod {
    pub name: String,
    pub kind: PeriodKind,
    /// Charge on the period's highest interval each month ($/kW).
    #[serde(default)]
    pub demand_charge_per_kw: f64,
    pub windows: Vec<TouWindow>,
}

impl TouPeriod {
    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        self.windows.iter().any(|w| w.contains(timestamp))
    }
}

/// A demand tariff: a facility-wide charge plus per-period charges.
///
/// Periods are matched in declaration order, so an interval covered by two
/// periods belongs to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateSchedule {
    pub name: String,
    /// Charge on the month's highest interval regardless of period ($/kW).
    #[serde(default)]
    pub facility_demand_charge_per_kw: f64,
    /// Periods the battery may discharge in; empty means every on-peak period.
    #[serde(default)]
    pub discharge_periods: Vec<String>,
    pub periods: Vec<TouPeriod>,
}

impl RateSchedule {
    /// Looks up a bundled schedule by name.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            OPTION_S => Some(Self::option_s()),
            _ => None,
        }
    }

    /// Exception tariff with a 4 pm to 9 pm on-peak window, a daytime
    /// super-off-peak window and overnight off-peak.
    pub fn option_s() -> Self {
        Self {
            name: OPTION_S.to_string(),
            facility_demand_charge_per_kw: 12.0,
            discharge_periods: vec!["on_peak".to_string()],
            periods: vec![
                TouPeriod {
                    name: "on_peak".to_string(),
                    kind: PeriodKind::OnPeak,
                    demand_charge_per_kw: 9.5,
                    windows: vec![TouWindow::new(16, 21)],
                },
                TouPeriod {
                    name: "super_off_peak".to_string(),
                    kind: PeriodKind::SuperOffPeak,
                    demand_charge_per_kw: 0.0,
                    windows: vec![TouWindow::new(8, 16)],
                },
                TouPeriod {
                    name: "off_peak".to_string(),
                    kind: PeriodKind::OffPeak,
                    demand_charge_per_kw: 0.0,
                    windows: vec![TouWindow::new(21, 8)],
                },
            ],
        }
    }

    /// Checks hours, months, rates and discharge period names.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidSchedule`] naming the first problem found.
    pub fn validate(&self) -> Result<(), InputError> {
        let invalid = |message: String| InputError::InvalidSchedule {
            name: self.name.clone(),
            message,
        };
        if self.periods.is_empty() {
            return Err(invalid("no periods defined".to_string()));
        }
        if !(self.facility_demand_charge_per_kw.is_finite()
            && self.facility_demand_charge_per_kw >= 0.0)
        {
            return Err(invalid(format!(
                "facility demand charge {} must be finite and >= 0",
                self.facility_demand_charge_per_kw
            )));
        }
        let mut seen = HashSet::new();
        for period in &self.periods {
            if !seen.insert(period.name.as_str()) {
                return Err(invalid(format!("period `{}` is defined twice", period.name)));
            }
            if !(period.demand_charge_per_kw.is_finite() && period.demand_charge_per_kw >= 0.0) {
                return Err(invalid(format!(
                    "period `{}` demand charge {} must be finite and >= 0",
                    period.name, period.demand_charge_per_kw
                )));
            }
            for w in &period.windows {
                if w.start_hour > 23 || w.end_hour > 24 {
                    return Err(invalid(format!(
                        "period `{}` window {}..{} is outside 0..24",
                        period.name, w.start_hour, w.end_hour
                    )));
                }
                if let Some(m) = w.months.iter().find(|m| !(1..=12).contains(*m)) {
                    return Err(invalid(format!("period `{}` names month {m}", period.name)));
                }
            }
        }
        if let Some(name) = self
            .discharge_periods
            .iter()
            .find(|name| !seen.contains(name.as_str()))
        {
            return Err(invalid(format!("discharge period `{name}` is not defined")));
        }
        Ok(())
    }

    /// The period covering `timestamp`, if any.
    pub fn period_at(&self, timestamp: &NaiveDateTime) -> Option<&TouPeriod> {
        self.periods.iter().find(|p| p.contains(timestamp))
    }

    pub fn is_discharge_period(&self, period: &TouPeriod) -> bool {
        if self.discharge_periods.is_empty() {
            period.kind == PeriodKind::OnPeak
        } else {
            self.discharge_periods.iter().any(|name| *name == period.name)
        }
    }
}
