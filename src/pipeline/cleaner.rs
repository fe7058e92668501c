//! Row cleaning: type coercion and removal of malformed rows.
//!
//! Coercion failures are local to the row. A row whose stress level or
//! timestamp does not coerce is dropped and recorded, never defaulted, and
//! cleaning as a whole never fails.

use crate::pipeline::types::{CleanRow, InputRow, MalformedRow, RowDefect};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Naive timestamp layouts accepted in batch files, tried in order.
const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Result of cleaning one batch.
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    /// Rows that survived coercion, in original order
    pub rows: Vec<CleanRow>,
    /// Rows that were dropped
    pub malformed: Vec<MalformedRow>,
}

impl CleanReport {
    /// Number of rows dropped as malformed.
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }
}

/// Coerce a stress level to a finite number.
///
/// Empty text, non-numeric text and non-finite values (`NaN`, `inf`) are
/// all treated as missing.
pub fn parse_stress_level(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Coerce a timestamp to a naive instant.
///
/// RFC 3339 values carrying an offset are normalised to UTC before the
/// offset is discarded. A bare date is read as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Coerce a single row, reporting which field(s) failed.
pub fn clean_row(row: &InputRow) -> Result<CleanRow, RowDefect> {
    let stress_level = row.stress_level.as_deref().and_then(parse_stress_level);
    let timestamp = row.timestamp.as_deref().and_then(parse_timestamp);

    match (stress_level, timestamp) {
        (Some(stress_level), Some(timestamp)) => Ok(CleanRow {
            position: row.position,
            subject_ref: row.subject_ref.clone(),
            stress_level,
            timestamp,
        }),
        (None, Some(_)) => Err(RowDefect::StressLevel),
        (Some(_), None) => Err(RowDefect::Timestamp),
        (None, None) => Err(RowDefect::Both),
    }
}

/// Clean a batch, keeping well-formed rows in their original order.
pub fn clean_rows(rows: &[InputRow]) -> CleanReport {
    let mut report = CleanReport::default();

    for row in rows {
        match clean_row(row) {
            Ok(clean) => report.rows.push(clean),
            Err(defect) => {
                tracing::debug!(position = row.position, %defect, "Dropping malformed row");
                report.malformed.push(MalformedRow {
                    position: row.position,
                    defect,
                });
            }
        }
    }

    report
}
