//! The ingestion agent: one batch in, one transactional write out.
//!
//! ```text
//! Idle → Validating → Cleaning → Classifying ─┬─ NoAlerts ───┬─→ Done
//!                                             └─ Persisting ─┘
//!          (any step) ──────────────────────────────────────────→ Failed
//! ```
//!
//! The agent performs exactly one run per call to [`Agent::run`]. The
//! datastore is contacted only when at least one row is flagged, and the
//! session it opens is released before `run` returns on every path.

use crate::pipeline::batch::{BatchSource, SourceError};
use crate::pipeline::classifier::classify;
use crate::pipeline::cleaner::clean_rows;
use crate::pipeline::identity::{IdentityAssigner, IdentityStrategy};
use crate::pipeline::schema::{validate_schema, SchemaError};
use crate::store::{AlertWriter, Datastore, StoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Agent lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Validating,
    Cleaning,
    Classifying,
    NoAlerts,
    Persisting,
    Done,
    Failed,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Done | AgentState::Failed)
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// No row exceeded the threshold; the datastore was not contacted.
    NoAlerts,
    /// Alerts were committed.
    Persisted { count: usize },
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    /// Data rows read from the batch
    pub rows_read: usize,
    /// Rows dropped during cleaning
    pub malformed: usize,
    /// Rows above the threshold
    pub flagged: usize,
    pub outcome: Outcome,
    /// States visited, in order
    pub states: Vec<AgentState>,
}

impl RunReport {
    /// Number of alerts committed by this run.
    pub fn alerts_written(&self) -> usize {
        match self.outcome {
            Outcome::NoAlerts => 0,
            Outcome::Persisted { count } => count,
        }
    }
}

/// Coarse failure classes, stable across surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    Schema,
    Persistence,
}

/// Why a run failed.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("batch source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("failed to read batch source {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to persist alerts: {0}")]
    Persistence(#[from] StoreError),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::SourceNotFound(_) | AgentError::SourceUnreadable { .. } => {
                ErrorKind::SourceUnavailable
            }
            AgentError::Schema(_) => ErrorKind::Schema,
            AgentError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<SourceError> for AgentError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::NotFound(path) => AgentError::SourceNotFound(path),
            SourceError::Unreadable { path, reason } => {
                AgentError::SourceUnreadable { path, reason }
            }
        }
    }
}

/// Records the states a run passes through.
struct StateTrail {
    states: Vec<AgentState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            states: vec![AgentState::Idle],
        }
    }

    fn current(&self) -> AgentState {
        self.states.last().copied().unwrap_or(AgentState::Idle)
    }

    fn advance(&mut self, next: AgentState) {
        tracing::debug!(from = ?self.current(), to = ?next, "Agent state change");
        self.states.push(next);
    }

    fn fail(&mut self, error: AgentError) -> AgentError {
        tracing::error!(state = ?self.current(), kind = ?error.kind(), "Agent run failed: {}", error);
        self.advance(AgentState::Failed);
        error
    }
}

/// Orchestrates validate → clean → classify → assign → persist.
pub struct Agent<'a> {
    store: &'a dyn Datastore,
    identity: IdentityAssigner,
}

impl<'a> Agent<'a> {
    pub fn new(store: &'a dyn Datastore) -> Self {
        Self {
            store,
            identity: IdentityAssigner::default(),
        }
    }

    /// Use a different identity strategy for flagged rows.
    pub fn with_identity(mut self, strategy: IdentityStrategy) -> Self {
        self.identity = IdentityAssigner::new(strategy);
        self
    }

    /// Run the pipeline once over the batch at `path`.
    pub fn run(&self, path: impl AsRef<Path>) -> Result<RunReport, AgentError> {
        let path = path.as_ref();
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("agent_run", %run_id);
        let _guard = span.enter();

        tracing::info!("Agent running");
        let result = self.run_inner(run_id, path);
        tracing::info!("Agent run finished");
        result
    }

    fn run_inner(&self, run_id: Uuid, path: &Path) -> Result<RunReport, AgentError> {
        let mut trail = StateTrail::new();

        trail.advance(AgentState::Validating);
        tracing::info!("Reading from {}", path.display());
        let source = BatchSource::open(path).map_err(|e| trail.fail(e.into()))?;
        validate_schema(source.headers()).map_err(|e| trail.fail(e.into()))?;

        let rows = source.read_rows().map_err(|e| trail.fail(e.into()))?;
        let rows_read = rows.len();
        tracing::info!("Successfully read {} records from {}", rows_read, path.display());

        trail.advance(AgentState::Cleaning);
        let cleaned = clean_rows(&rows);
        drop(rows);
        let malformed = cleaned.malformed_count();
        if malformed > 0 {
            tracing::warn!(
                "Dropped {} malformed rows out of {} from {}",
                malformed,
                rows_read,
                path.display()
            );
        }

        trail.advance(AgentState::Classifying);
        let flagged_rows = classify(cleaned.rows);
        let flagged = flagged_rows.len();

        if flagged_rows.is_empty() {
            tracing::info!("No high stress subjects were found in {}", path.display());
            trail.advance(AgentState::NoAlerts);
            trail.advance(AgentState::Done);
            return Ok(RunReport {
                run_id,
                source: path.to_path_buf(),
                rows_read,
                malformed,
                flagged: 0,
                outcome: Outcome::NoAlerts,
                states: trail.states,
            });
        }

        trail.advance(AgentState::Persisting);
        tracing::info!("Flagged {} subjects as high stress", flagged);
        let alerts = self.identity.assign(flagged_rows);

        let count = {
            let mut session = self
                .store
                .connect()
                .map_err(|e| trail.fail(e.into()))?;
            AlertWriter::new(session.as_mut())
                .write(&alerts)
                .map_err(|e| trail.fail(e.into()))?
        };

        trail.advance(AgentState::Done);
        Ok(RunReport {
            run_id,
            source: path.to_path_buf(),
            rows_read,
            malformed,
            flagged,
            outcome: Outcome::Persisted { count },
            states: trail.states,
        })
    }
}
