//! Alert storage.
//!
//! The pipeline and the read path only see the [`Datastore`] capability.
//! A datastore hands out one [`Session`] per unit of work (a single agent
//! run or a single read); the session owns its connection and releases it
//! when dropped, rolling back any transaction that was not committed.
//!
//! Two backends are provided:
//! - [`SqliteStore`]: file-backed, one connection per session
//! - [`MemoryStore`]: in-process, with call counting and fault injection

pub mod memory;
pub mod reader;
pub mod sqlite;
pub mod writer;

use crate::pipeline::types::FlaggedAlert;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryStore, StoreCalls};
pub use reader::{format_alert, AlertReader, AlertView};
pub use sqlite::SqliteStore;
pub use writer::AlertWriter;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to datastore: {0}")]
    Connect(String),
    #[error("failed to prepare datastore schema: {0}")]
    Schema(String),
    #[error("failed to write alert: {0}")]
    Write(String),
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("failed to query alerts: {0}")]
    Query(String),
    #[error("failed to decode stored alert: {0}")]
    Decode(String),
}

/// Ordering contract for alert reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrder {
    /// Whatever order the backend returns rows in.
    Storage,
    /// Timestamp descending.
    NewestFirst,
}

/// A persisted alert row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAlert {
    pub user_id: String,
    /// Raw stress score as written (0-100+ scale)
    pub stress_score: f64,
    pub timestamp: NaiveDateTime,
}

impl From<&FlaggedAlert> for StoredAlert {
    fn from(alert: &FlaggedAlert) -> Self {
        Self {
            user_id: alert.user_id.clone(),
            stress_score: alert.stress_level,
            timestamp: alert.timestamp,
        }
    }
}

/// Something that can open sessions against the alert table.
pub trait Datastore: Send + Sync {
    /// Open a new session. Each call yields an independent connection.
    fn connect(&self) -> Result<Box<dyn Session + '_>, StoreError>;
}

/// One live connection to the alert table.
///
/// Dropping a session releases the connection; an open transaction is
/// rolled back at that point.
pub trait Session {
    /// Start a transaction.
    fn begin(&mut self) -> Result<(), StoreError>;

    /// Insert one alert row. Outside a transaction the write is implicit.
    fn insert_alert(&mut self, alert: &FlaggedAlert) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Read every stored alert in the requested order.
    fn fetch_alerts(&mut self, order: AlertOrder) -> Result<Vec<StoredAlert>, StoreError>;
}
