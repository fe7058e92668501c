//! Ingestion pipeline for the stress alert agent.
//!
//! This module contains:
//! - Batch reading and schema validation
//! - Row cleaning and stress classification
//! - Identity assignment for flagged rows
//! - The agent that runs the stages in order and persists the result

pub mod agent;
pub mod batch;
pub mod classifier;
pub mod cleaner;
pub mod identity;
pub mod schema;
pub mod types;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentState, ErrorKind, Outcome, RunReport};
pub use batch::{BatchSource, SourceError, STRESS_LEVEL_COLUMN, SUBJECT_COLUMN, TIMESTAMP_COLUMN};
pub use classifier::{classify, is_high_stress, STRESS_THRESHOLD};
pub use cleaner::{clean_row, clean_rows, parse_stress_level, parse_timestamp, CleanReport};
pub use identity::{IdentityAssigner, IdentityStrategy};
pub use schema::{validate_schema, SchemaError, REQUIRED_COLUMNS};
pub use types::{CleanRow, FlaggedAlert, InputRow, MalformedRow, RowDefect};
