//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use bess_sizing::battery::{BatterySpec, CatalogBattery, PriceTier};
use bess_sizing::profile::LoadProfile;
use chrono::{NaiveDate, NaiveDateTime};

/// Midnight, Monday 1 January 2024.
pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date")
}

/// One day of 15-minute readings at 50 kW with a one-hour spike to 120 kW
/// starting at 10:00.
pub fn spike_profile() -> LoadProfile {
    let mut kw = vec![50.0; 96];
    for v in &mut kw[40..44] {
        *v = 120.0;
    }
    LoadProfile::from_kw(start(), 15, &kw).expect("valid profile")
}

/// A 50 kWh / 50 kW battery at 90% round-trip efficiency.
pub fn spike_battery() -> BatterySpec {
    BatterySpec::new(50.0, 50.0, 0.9)
}

/// `days` of hourly readings at 600 kW with a daily two-hour block at
/// 1000 kW from 14:00.
pub fn facility_profile(days: usize) -> LoadProfile {
    let kw: Vec<f64> = (0..days * 24)
        .map(|h| if matches!(h % 24, 14 | 15) { 1000.0 } else { 600.0 })
        .collect();
    LoadProfile::from_kw(start(), 60, &kw).expect("valid profile")
}

/// Catalog entry priced at $500/kWh: 250 kWh / 125 kW for $125,000 a unit.
pub fn powerblock() -> CatalogBattery {
    CatalogBattery {
        model_name: "PowerBlock 250".to_string(),
        manufacturer: "Acme".to_string(),
        warranty_years: 10,
        spec: BatterySpec::new(250.0, 125.0, 0.9),
        price_tiers: vec![PriceTier {
            min_quantity: 1,
            unit_price: 125_000.0,
        }],
    }
}

/// Catalog entry too expensive to pay back inside any preset's limits.
pub fn gold_plated() -> CatalogBattery {
    CatalogBattery {
        model_name: "Gilded 250".to_string(),
        manufacturer: "Luxe".to_string(),
        warranty_years: 20,
        spec: BatterySpec::new(250.0, 125.0, 0.9),
        price_tiers: vec![PriceTier {
            min_quantity: 1,
            unit_price: 2_500_000.0,
        }],
    }
}

/// TOML text describing [`powerblock`] as a one-entry catalog.
pub const POWERBLOCK_TOML: &str = r#"
[[battery]]
model_name = "PowerBlock 250"
manufacturer = "Acme"
warranty_years = 10
capacity_kwh = 250.0
max_power_kw = 125.0
round_trip_efficiency = 0.9
price_tiers = [{ min_quantity = 1, unit_price = 125000.0 }]
"#;
