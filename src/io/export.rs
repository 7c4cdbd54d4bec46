//! CSV export of a dispatched series.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::profile::LoadProfile;

/// Column header for dispatch telemetry export.
const HEADER: &str = "index,timestamp,load_kw,net_load_kw,battery_kw,soc_kwh";

/// Exports a dispatched series to a CSV file at the given path.
///
/// `net_load_kw` and `soc_history_kwh` come from either dispatcher and must
/// line up with `profile`. `battery_kw` is positive while discharging.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails, or if the series
/// lengths differ from the profile.
pub fn export_csv(
    profile: &LoadProfile,
    net_load_kw: &[f64],
    soc_history_kwh: &[f64],
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(profile, net_load_kw, soc_history_kwh, buf)
}

/// Writes a dispatched series as CSV to any writer.
///
/// # Errors
///
/// See [`export_csv`].
pub fn write_csv(
    profile: &LoadProfile,
    net_load_kw: &[f64],
    soc_history_kwh: &[f64],
    writer: impl Write,
) -> io::Result<()> {
    if net_load_kw.len() != profile.len() || soc_history_kwh.len() != profile.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "profile has {} intervals but the series have {} and {} values",
                profile.len(),
                net_load_kw.len(),
                soc_history_kwh.len()
            ),
        ));
    }

    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(','))?;

    for (i, ((interval, net), soc)) in profile
        .intervals()
        .iter()
        .zip(net_load_kw)
        .zip(soc_history_kwh)
        .enumerate()
    {
        wtr.write_record(&[
            i.to_string(),
            interval.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{:.4}", interval.kw),
            format!("{:.4}", net),
            format!("{:.4}", interval.kw - net),
            format!("{:.4}", soc),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
