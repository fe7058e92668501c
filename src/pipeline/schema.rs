//! Batch schema validation.

use crate::pipeline::batch::{STRESS_LEVEL_COLUMN, TIMESTAMP_COLUMN};
use std::collections::HashSet;
use thiserror::Error;

/// Columns every batch must carry, in reporting order.
pub const REQUIRED_COLUMNS: [&str; 2] = [TIMESTAMP_COLUMN, STRESS_LEVEL_COLUMN];

/// A batch is missing one or more required columns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required column(s): {}", .missing.join(", "))]
pub struct SchemaError {
    pub missing: Vec<String>,
}

/// Check that every required column is present in `headers`.
///
/// This is a single containment test over the header set; rows are never
/// inspected.
pub fn validate_schema<I, S>(headers: I) -> Result<(), SchemaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let present: HashSet<String> = headers
        .into_iter()
        .map(|h| h.as_ref().trim().to_string())
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !present.contains(**column))
        .map(|column| column.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_schema_with_extra_columns() {
        assert!(validate_schema(["subject_ref", "stress_level", "timestamp", "mood"]).is_ok());
    }

    #[test]
    fn test_missing_stress_level() {
        let err = validate_schema(["timestamp", "sample_column"]).unwrap_err();
        assert_eq!(err.missing, vec!["stress_level".to_string()]);
        assert_eq!(err.to_string(), "missing required column(s): stress_level");
    }

    #[test]
    fn test_missing_both_in_fixed_order() {
        let err = validate_schema(Vec::<String>::new()).unwrap_err();
        assert_eq!(err.missing, vec!["timestamp", "stress_level"]);
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let err = validate_schema(["Timestamp", "stress_level"]).unwrap_err();
        assert_eq!(err.missing, vec!["timestamp"]);
    }
}
