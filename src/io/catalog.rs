//! TOML loaders for battery catalogs and rate schedules.
//!
//! A catalog file is a list of `[[battery]]` tables:
//!
//! ```toml
//! [[battery]]
//! model_name = "PowerBlock 250"
//! manufacturer = "Acme"
//! warranty_years = 10
//! capacity_kwh = 250.0
//! max_power_kw = 125.0
//! round_trip_efficiency = 0.9
//! price_tiers = [{ min_quantity = 1, unit_price = 125000.0 }]
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::battery::CatalogBattery;
use crate::error::InputError;
use crate::tariff::RateSchedule;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read \"{path}\": {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown rate schedule \"{0}\"")]
    UnknownSchedule(String),

    #[error(transparent)]
    Invalid(#[from] InputError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    battery: Vec<CatalogBattery>,
}

fn read(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Loads a battery catalog from a TOML file.
///
/// Entries are not validated here; the selector skips invalid ones and says
/// so in its log.
///
/// # Errors
///
/// Returns a [`CatalogError`] if the file cannot be read or parsed.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogBattery>, CatalogError> {
    parse_catalog(&read(path)?)
}

/// Parses a battery catalog from TOML text.
///
/// # Errors
///
/// Returns [`CatalogError::Toml`] for malformed TOML or unknown fields.
pub fn parse_catalog(s: &str) -> Result<Vec<CatalogBattery>, CatalogError> {
    let file: CatalogFile = toml::from_str(s)?;
    Ok(file.battery)
}

/// Resolves a rate schedule from a bundled name or a TOML file path.
///
/// # Errors
///
/// Returns a [`CatalogError`] if the name is unknown and no such file
/// exists, or if the file does not describe a valid schedule.
pub fn load_schedule(name_or_path: &str) -> Result<RateSchedule, CatalogError> {
    if let Some(schedule) = RateSchedule::named(name_or_path) {
        return Ok(schedule);
    }
    let path = Path::new(name_or_path);
    if !path.exists() {
        return Err(CatalogError::UnknownSchedule(name_or_path.to_string()));
    }
    parse_schedule(&read(path)?)
}

/// Parses and validates a rate schedule from TOML text.
///
/// # Errors
///
/// Returns a [`CatalogError`] for malformed TOML or an invalid schedule.
pub fn parse_schedule(s: &str) -> Result<RateSchedule, CatalogError> {
    let schedule: RateSchedule = toml::from_str(s)?;
    schedule.validate()?;
    Ok(schedule)
}
