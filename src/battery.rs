//! Battery physical parameters and catalog entries with tiered pricing.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Physical parameters of a stationary battery used for peak shaving.
///
/// State of charge is tracked in absolute kWh between a floor of
/// `capacity_kwh × min_soc` and a ceiling of floor + usable energy, where
/// usable energy is `capacity_kwh × (max_soc − min_soc) × depth_of_discharge`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    /// Nameplate energy capacity in kilowatt-hours.
    pub capacity_kwh: f64,

    /// Maximum charge and discharge power in kilowatts.
    pub max_power_kw: f64,

    /// Round-trip efficiency (0..1.0], applied entirely on the charge leg.
    pub round_trip_efficiency: f64,

    /// Annual capacity fade as a fraction (0.02 = 2 % per year).
    #[serde(default)]
    pub degradation_rate: f64,

    /// Lowest allowed state of charge as a fraction of capacity.
    #[serde(default)]
    pub min_soc: f64,

    /// Highest allowed state of charge as a fraction of capacity.
    #[serde(default = "default_max_soc")]
    pub max_soc: f64,

    /// Fraction of the SOC window the operator is willing to cycle.
    #[serde(default = "default_depth_of_discharge")]
    pub depth_of_discharge: f64,
}

fn default_max_soc() -> f64 {
    1.0
}

fn default_depth_of_discharge() -> f64 {
    1.0
}

impl BatterySpec {
    /// Creates a battery with a full SOC window and no degradation.
    ///
    /// # Arguments
    ///
    /// * `capacity_kwh` - Nameplate energy capacity
    /// * `max_power_kw` - Charge/discharge power limit
    /// * `round_trip_efficiency` - Efficiency in (0, 1]
    pub fn new(capacity_kwh: f64, max_power_kw: f64, round_trip_efficiency: f64) -> Self {
        Self {
            capacity_kwh,
            max_power_kw,
            round_trip_efficiency,
            degradation_rate: 0.0,
            min_soc: 0.0,
            max_soc: 1.0,
            depth_of_discharge: 1.0,
        }
    }

    /// Restricts the SOC window.
    #[must_use]
    pub fn with_soc_window(mut self, min_soc: f64, max_soc: f64) -> Self {
        self.min_soc = min_soc;
        self.max_soc = max_soc;
        self
    }

    /// Sets the depth of discharge.
    #[must_use]
    pub fn with_depth_of_discharge(mut self, depth_of_discharge: f64) -> Self {
        self.depth_of_discharge = depth_of_discharge;
        self
    }

    /// Checks every field against its physical range.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as an [`InputError`].
    pub fn validate(&self) -> Result<(), InputError> {
        if !(self.round_trip_efficiency > 0.0 && self.round_trip_efficiency <= 1.0) {
            return Err(InputError::InvalidEfficiency(self.round_trip_efficiency));
        }
        if !(self.min_soc.is_finite() && self.max_soc.is_finite()) || self.min_soc >= self.max_soc
        {
            return Err(InputError::InvalidSocBounds {
                min_soc: self.min_soc,
                max_soc: self.max_soc,
            });
        }
        if self.min_soc < 0.0 || self.max_soc > 1.0 {
            return Err(InputError::InvalidBattery {
                field: "min_soc/max_soc",
                message: format!(
                    "SOC window [{}, {}] must lie within [0, 1]",
                    self.min_soc, self.max_soc
                ),
            });
        }
        if !(self.depth_of_discharge > 0.0 && self.depth_of_discharge <= 1.0) {
            return Err(InputError::InvalidBattery {
                field: "depth_of_discharge",
                message: format!("{} is outside (0, 1]", self.depth_of_discharge),
            });
        }
        if !(self.capacity_kwh.is_finite() && self.capacity_kwh >= 0.0) {
            return Err(InputError::InvalidBattery {
                field: "capacity_kwh",
                message: format!("{} must be finite and >= 0", self.capacity_kwh),
            });
        }
        if !(self.max_power_kw.is_finite() && self.max_power_kw >= 0.0) {
            return Err(InputError::InvalidBattery {
                field: "max_power_kw",
                message: format!("{} must be finite and >= 0", self.max_power_kw),
            });
        }
        if !(0.0..1.0).contains(&self.degradation_rate) {
            return Err(InputError::InvalidBattery {
                field: "degradation_rate",
                message: format!("{} is outside [0, 1)", self.degradation_rate),
            });
        }
        Ok(())
    }

    /// Energy the dispatcher may cycle (kWh).
    pub fn usable_kwh(&self) -> f64 {
        self.capacity_kwh * (self.max_soc - self.min_soc) * self.depth_of_discharge
    }

    /// Lowest stored energy the dispatcher may reach (kWh).
    pub fn floor_kwh(&self) -> f64 {
        self.capacity_kwh * self.min_soc
    }

    /// Highest stored energy the dispatcher may reach (kWh).
    pub fn ceiling_kwh(&self) -> f64 {
        self.floor_kwh() + self.usable_kwh()
    }

    /// `quantity` identical units operated as one: capacity and power scale linearly.
    #[must_use]
    pub fn scaled(&self, quantity: u32) -> Self {
        let q = f64::from(quantity);
        Self {
            capacity_kwh: self.capacity_kwh * q,
            max_power_kw: self.max_power_kw * q,
            ..*self
        }
    }
}

/// Unit price that applies from `min_quantity` units upward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub min_quantity: u32,
    pub unit_price: f64,
}

/// A purchasable battery model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogBattery {
    pub model_name: String,
    pub manufacturer: String,
    #[serde(default)]
    pub warranty_years: u32,
    #[serde(flatten)]
    pub spec: BatterySpec,
    /// Quantity-tiered unit pricing; need not be sorted.
    pub price_tiers: Vec<PriceTier>,
}

impl CatalogBattery {
    /// Validates the physical spec and the price table.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] for an invalid spec, an empty price table, a
    /// table that does not cover a single unit, or a negative price.
    pub fn validate(&self) -> Result<(), InputError> {
        self.spec.validate()?;
        if !self.price_tiers.iter().any(|t| t.min_quantity <= 1) {
            return Err(InputError::InvalidBattery {
                field: "price_tiers",
                message: format!("`{}` has no price for a single unit", self.model_name),
            });
        }
        if let Some(tier) = self
            .price_tiers
            .iter()
            .find(|t| !(t.unit_price.is_finite() && t.unit_price >= 0.0))
        {
            return Err(InputError::InvalidBattery {
                field: "price_tiers",
                message: format!("unit price {} must be finite and >= 0", tier.unit_price),
            });
        }
        Ok(())
    }

    /// Unit price at `quantity`: the tier with the largest `min_quantity <= quantity`.
    pub fn unit_price(&self, quantity: u32) -> f64 {
        self.price_tiers
            .iter()
            .filter(|t| t.min_quantity <= quantity.max(1))
            .max_by_key(|t| t.min_quantity)
            .map_or(f64::INFINITY, |t| t.unit_price)
    }

    /// Material cost of `quantity` units; zero units cost nothing.
    pub fn system_cost(&self, quantity: u32) -> f64 {
        if quantity == 0 {
            0.0
        } else {
            self.unit_price(quantity) * f64::from(quantity)
        }
    }

    /// Physical spec of `quantity` units.
    pub fn spec_for(&self, quantity: u32) -> BatterySpec {
        self.spec.scaled(quantity)
    }
}
