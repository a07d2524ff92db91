//! JSON-safe rendering of raw row values
//!
//! Non-finite floats become null and date/time values become ISO-8601 text.
//! Every output value maps to itself, so normalizing twice changes nothing.

use chrono::SecondsFormat;
use shared::{CellValue, Row};

pub fn normalize_value(value: CellValue) -> CellValue {
    match value {
        CellValue::Float(v) if !v.is_finite() => CellValue::Null,
        CellValue::Date(d) => CellValue::Text(d.format("%Y-%m-%d").to_string()),
        CellValue::Timestamp(ts) => CellValue::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        CellValue::TimestampTz(ts) => {
            CellValue::Text(ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        }
        other => other,
    }
}

pub fn normalize_row(row: Row) -> Row {
    row.into_iter()
        .map(|(column, value)| (column, normalize_value(value)))
        .collect()
}

pub fn normalize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter().map(normalize_row).collect()
}
