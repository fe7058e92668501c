//! Run ledger for the stress alert agent.
//!
//! Keeps cumulative counts of runs, rows and alerts so operators can see
//! what the agent has done without querying the alert table.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_ledger_with_persistence, RunLedger, RunStats, SharedRunLedger};
