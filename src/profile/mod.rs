//! Facility load series: the validated data model and a synthetic generator.

pub mod load_profile;
/// Seeded synthetic facility-load generator.
pub mod synthetic;

pub use load_profile::{Interval, LoadProfile, MonthKey};
pub use synthetic::FacilityLoad;
