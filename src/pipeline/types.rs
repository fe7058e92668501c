//! Row types that flow through one agent run.
//!
//! Every type here is transient: rows live only for the duration of a
//! single run and are never mutated once they have been persisted.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One observation exactly as it appeared in the batch.
///
/// Fields are raw text; `None` means the column was absent or the row was
/// too short to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    /// Zero-based index of the row in the original (uncleaned) batch
    pub position: usize,
    /// Batch-local subject reference, if the batch carries one
    pub subject_ref: Option<String>,
    /// Raw stress level text
    pub stress_level: Option<String>,
    /// Raw timestamp text
    pub timestamp: Option<String>,
}

impl InputRow {
    pub fn new(
        position: usize,
        stress_level: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            position,
            subject_ref: None,
            stress_level: Some(stress_level.into()),
            timestamp: Some(timestamp.into()),
        }
    }

    /// Attach a subject reference to the row.
    pub fn with_subject(mut self, subject_ref: impl Into<String>) -> Self {
        self.subject_ref = Some(subject_ref.into());
        self
    }
}

/// A row whose stress level and timestamp both coerced cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRow {
    pub position: usize,
    pub subject_ref: Option<String>,
    /// Finite stress level
    pub stress_level: f64,
    /// Observation instant (naive; no timezone is attached)
    pub timestamp: NaiveDateTime,
}

/// A clean row above the stress threshold, with its assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedAlert {
    pub user_id: String,
    pub stress_level: f64,
    pub timestamp: NaiveDateTime,
}

/// Why a row was dropped during cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowDefect {
    StressLevel,
    Timestamp,
    Both,
}

impl std::fmt::Display for RowDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowDefect::StressLevel => write!(f, "unparsable stress_level"),
            RowDefect::Timestamp => write!(f, "unparsable timestamp"),
            RowDefect::Both => write!(f, "unparsable stress_level and timestamp"),
        }
    }
}

/// A dropped row, kept only for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRow {
    pub position: usize,
    pub defect: RowDefect,
}
