//! Battery dispatch simulation and peak-shaving sizing under monthly demand charges.

/// Battery specifications and priced catalog entries.
pub mod battery;
pub mod config;
pub mod error;
pub mod io;
pub mod profile;
mod report;
/// Flat-threshold dispatch, billing peaks and peak events.
pub mod sim;
/// Cap discovery, threshold optimization and portfolio selection.
pub mod sizing;
/// Time-of-use schedules and window dispatch.
pub mod tariff;
