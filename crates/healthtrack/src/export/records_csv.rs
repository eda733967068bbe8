//! CSV export of a user's records.

use std::io::Write;

use crate::error::{Error, Result};
use crate::record::HealthRecord;

/// Column headers, in output order.
pub const HEADER: [&str; 8] = [
    "Date",
    "Sleep Hours",
    "Water Intake (L)",
    "Weight (kg)",
    "Height (cm)",
    "Mood",
    "Notes",
    "Created At",
];

fn number(value: f64) -> String {
    format!("{value:?}")
}

/// Write records as CSV, one row per record in the given order.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write<W: Write>(records: &[HealthRecord], out: W) -> Result<()> {
    let mut writer = ::csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;
    for record in records {
        writer.write_record([
            record.date.to_string(),
            number(record.sleep_hours),
            number(record.water_intake),
            record.weight.map(number).unwrap_or_default(),
            record.height.map(number).unwrap_or_default(),
            record.mood.code().to_string(),
            record.notes.clone().unwrap_or_default(),
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Render records as a CSV string.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_string(records: &[HealthRecord]) -> Result<String> {
    let mut buffer = Vec::new();
    write(records, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| Error::export(format!("CSV is not UTF-8: {e}")))
}
