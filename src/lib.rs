//! Stress Alert Agent - batch ingestion of stress observations.
//!
//! This library reads periodic batches of sensor/survey observations,
//! flags subjects whose stress level exceeds a fixed threshold, persists
//! the flagged rows as alerts and serves the current alert set.
//!
//! # Guarantees
//!
//! - **Strict threshold**: only levels above 70 are flagged; 70 itself is not
//! - **No defaults**: malformed rows are dropped, never coerced to a value
//! - **All or nothing**: one run's alerts commit together or not at all
//! - **No idle connections**: one datastore session per run or read
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Stress Alert Agent                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//! │  │  Schema  │──▶│  Clean   │──▶│ Classify │──▶│ Identity │  │
//! │  │ (header) │   │  (rows)  │   │  (> 70)  │   │ (user_N) │  │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────────┘  │
//! │                                                     │       │
//! │                                                     ▼       │
//! │  ┌──────────┐                                ┌──────────┐   │
//! │  │  Alert   │◀──────── high_stress_users ◀───│  Alert   │   │
//! │  │  Reader  │                                │  Writer  │   │
//! │  └──────────┘                                └──────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stress_alert_agent::{Agent, SqliteStore};
//! use std::time::Duration;
//!
//! let store = SqliteStore::open("alerts.db", Duration::from_secs(5)).expect("open store");
//! let report = Agent::new(&store).run("batch.csv").expect("agent run");
//! println!("{} alerts written", report.alerts_written());
//! ```

pub mod config;
pub mod handler;
pub mod ledger;
pub mod pipeline;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use handler::{handle_get_alerts, handle_run_event, FunctionResponse};
pub use ledger::{RunLedger, RunStats, SharedRunLedger};
pub use pipeline::{
    Agent, AgentError, AgentState, ErrorKind, IdentityStrategy, Outcome, RunReport,
    STRESS_THRESHOLD,
};
pub use store::{
    AlertOrder, AlertReader, AlertView, AlertWriter, Datastore, MemoryStore, Session,
    SqliteStore, StoreError, StoredAlert,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
