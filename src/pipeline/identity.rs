//! Subject identity assignment for flagged rows.

use crate::pipeline::types::{CleanRow, FlaggedAlert};
use serde::{Deserialize, Serialize};

/// Prefix for positional user ids.
pub const USER_ID_PREFIX: &str = "user_";

/// How flagged rows get their `user_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// `user_<position>` from the row's index in the original batch.
    ///
    /// Unique within a run; not stable across runs.
    #[default]
    Positional,
    /// The batch's `subject_ref` value, falling back to positional when the
    /// cell is absent or blank.
    ///
    /// Rows with the same subject share a user id, so ids are not unique
    /// within a run under this strategy.
    SubjectColumn,
}

impl std::str::FromStr for IdentityStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "subject_column" | "subject-column" => Ok(Self::SubjectColumn),
            other => Err(format!(
                "unknown identity strategy '{other}' (expected positional or subject_column)"
            )),
        }
    }
}

/// Assigns user ids to flagged rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAssigner {
    strategy: IdentityStrategy,
}

impl IdentityAssigner {
    pub fn new(strategy: IdentityStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> IdentityStrategy {
        self.strategy
    }

    /// Derive the user id for one row.
    pub fn user_id_for(&self, row: &CleanRow) -> String {
        if self.strategy == IdentityStrategy::SubjectColumn {
            if let Some(subject) = row.subject_ref.as_deref().map(str::trim) {
                if !subject.is_empty() {
                    return subject.to_string();
                }
            }
        }
        format!("{USER_ID_PREFIX}{}", row.position)
    }

    /// Turn flagged rows into alerts, preserving order.
    pub fn assign(&self, rows: Vec<CleanRow>) -> Vec<FlaggedAlert> {
        rows.into_iter()
            .map(|row| FlaggedAlert {
                user_id: self.user_id_for(&row),
                stress_level: row.stress_level,
                timestamp: row.timestamp,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(position: usize, subject_ref: Option<&str>) -> CleanRow {
        CleanRow {
            position,
            subject_ref: subject_ref.map(str::to_string),
            stress_level: 80.0,
            timestamp: NaiveDate::from_ymd_opt(2025, 6, 11)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_positional_uses_original_index() {
        let assigner = IdentityAssigner::default();
        let alerts = assigner.assign(vec![row(1, Some("S-1")), row(4, None)]);

        assert_eq!(alerts[0].user_id, "user_1");
        assert_eq!(alerts[1].user_id, "user_4");
    }

    #[test]
    fn test_subject_column_falls_back_to_position() {
        let assigner = IdentityAssigner::new(IdentityStrategy::SubjectColumn);

        assert_eq!(assigner.user_id_for(&row(0, Some(" S-17 "))), "S-17");
        assert_eq!(assigner.user_id_for(&row(2, Some(""))), "user_2");
        assert_eq!(assigner.user_id_for(&row(3, None)), "user_3");
    }

    #[test]
    fn test_subject_column_repeats_ids_for_same_subject() {
        let assigner = IdentityAssigner::new(IdentityStrategy::SubjectColumn);
        let alerts = assigner.assign(vec![row(0, Some("S-1")), row(5, Some("S-1"))]);

        assert_eq!(alerts[0].user_id, alerts[1].user_id);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "subject_column".parse::<IdentityStrategy>(),
            Ok(IdentityStrategy::SubjectColumn)
        );
        assert_eq!(
            "Positional".parse::<IdentityStrategy>(),
            Ok(IdentityStrategy::Positional)
        );
        assert!("hash".parse::<IdentityStrategy>().is_err());
    }
}
