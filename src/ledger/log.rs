//! Cumulative run ledger.
//!
//! Tracks what the agent has ingested across runs: how many runs started
//! and how they ended, how many rows were read and dropped, and how many
//! alerts were written. Counts only; no row content is kept.

use crate::pipeline::{AgentError, RunReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Run statistics for this process, optionally backed by a file.
#[derive(Debug)]
pub struct RunLedger {
    /// Runs started
    runs_started: AtomicU64,
    /// Runs that reached Done
    runs_completed: AtomicU64,
    /// Runs that reached Failed
    runs_failed: AtomicU64,
    /// Data rows read across all runs
    rows_read: AtomicU64,
    /// Rows dropped as malformed
    rows_malformed: AtomicU64,
    /// Alerts committed
    alerts_written: AtomicU64,
    /// When this ledger was created
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl RunLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            rows_read: AtomicU64::new(0),
            rows_malformed: AtomicU64::new(0),
            alerts_written: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a ledger that loads from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut ledger = Self::new();
        ledger.persist_path = Some(path);

        if let Err(e) = ledger.load() {
            tracing::warn!("Could not load previous run ledger: {}", e);
        }

        ledger
    }

    /// Record the result of one agent run.
    pub fn record_run(&self, result: &Result<RunReport, AgentError>) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(report) => {
                self.runs_completed.fetch_add(1, Ordering::Relaxed);
                self.rows_read
                    .fetch_add(report.rows_read as u64, Ordering::Relaxed);
                self.rows_malformed
                    .fetch_add(report.malformed as u64, Ordering::Relaxed);
                self.alerts_written
                    .fetch_add(report.alerts_written() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.runs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the current statistics.
    pub fn stats(&self) -> RunStats {
        RunStats {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_malformed: self.rows_malformed.load(Ordering::Relaxed),
            alerts_written: self.alerts_written.load(Ordering::Relaxed),
            session_start: self.session_start,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics:\n\
             - Runs started: {}\n\
             - Runs completed: {}\n\
             - Runs failed: {}\n\
             - Rows read: {}\n\
             - Rows dropped as malformed: {}\n\
             - Alerts written: {}",
            stats.runs_started,
            stats.runs_completed,
            stats.runs_failed,
            stats.rows_read,
            stats.rows_malformed,
            stats.alerts_written
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                runs_started: stats.runs_started,
                runs_completed: stats.runs_completed,
                runs_failed: stats.runs_failed,
                rows_read: stats.rows_read,
                rows_malformed: stats.rows_malformed,
                alerts_written: stats.alerts_written,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.runs_started
                    .store(persisted.runs_started, Ordering::Relaxed);
                self.runs_completed
                    .store(persisted.runs_completed, Ordering::Relaxed);
                self.runs_failed
                    .store(persisted.runs_failed, Ordering::Relaxed);
                self.rows_read.store(persisted.rows_read, Ordering::Relaxed);
                self.rows_malformed
                    .store(persisted.rows_malformed, Ordering::Relaxed);
                self.alerts_written
                    .store(persisted.alerts_written, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of run statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub rows_read: u64,
    pub rows_malformed: u64,
    pub alerts_written: u64,
    pub session_start: DateTime<Utc>,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    runs_started: u64,
    runs_completed: u64,
    runs_failed: u64,
    rows_read: u64,
    rows_malformed: u64,
    alerts_written: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared run ledger.
pub type SharedRunLedger = Arc<RunLedger>;

/// Create a new shared ledger with persistence.
pub fn create_shared_ledger_with_persistence(path: PathBuf) -> SharedRunLedger {
    Arc::new(RunLedger::with_persistence(path))
}
