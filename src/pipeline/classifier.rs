//! Stress-threshold classification.

use crate::pipeline::types::CleanRow;

/// Stress level above which an observation is flagged.
///
/// The comparison is strict: a row exactly at the threshold is not flagged.
pub const STRESS_THRESHOLD: f64 = 70.0;

/// Whether a stress level qualifies as high stress.
pub fn is_high_stress(stress_level: f64) -> bool {
    stress_level > STRESS_THRESHOLD
}

/// Keep only rows above the threshold, preserving order.
pub fn classify(rows: Vec<CleanRow>) -> Vec<CleanRow> {
    rows.into_iter()
        .filter(|row| is_high_stress(row.stress_level))
        .collect()
}
