//! CSV load-profile import.
//!
//! Expects a header row and two columns, `timestamp,kw`. Extra columns are
//! ignored; column order follows the header.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::error::InputError;
use crate::profile::{Interval, LoadProfile};

/// Timestamp layouts accepted in the `timestamp` column.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot open \"{path}\": {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("header has no `{0}` column")]
    MissingColumn(&'static str),

    #[error("row {row}: cannot parse timestamp \"{value}\"")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: cannot parse kW value \"{value}\"")]
    Load { row: usize, value: String },

    #[error(transparent)]
    Profile(#[from] InputError),
}

/// Reads a load profile from a CSV file.
///
/// # Errors
///
/// Returns an [`ImportError`] if the file cannot be read, a row cannot be
/// parsed, or the series breaks a [`LoadProfile`] invariant.
pub fn import_profile_csv(path: &Path) -> Result<LoadProfile, ImportError> {
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.display().to_string(),
        source,
    })?;
    read_profile_csv(file)
}

/// Reads a load profile from any CSV source.
///
/// # Errors
///
/// See [`import_profile_csv`].
pub fn read_profile_csv(reader: impl Read) -> Result<LoadProfile, ImportError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or(ImportError::MissingColumn(name))
    };
    let ts_col = column("timestamp")?;
    let kw_col = column("kw")?;

    let mut intervals = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is row 1.
        let row = i + 2;
        let ts = record.get(ts_col).unwrap_or_default();
        let kw = record.get(kw_col).unwrap_or_default();

        let timestamp = parse_timestamp(ts).ok_or_else(|| ImportError::Timestamp {
            row,
            value: ts.to_string(),
        })?;
        let kw: f64 = kw.parse().map_err(|_| ImportError::Load {
            row,
            value: kw.to_string(),
        })?;
        intervals.push(Interval::new(timestamp, kw));
    }

    Ok(LoadProfile::new(intervals)?)
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}
