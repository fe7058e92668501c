//! SQLite-backed alert store.

use crate::pipeline::cleaner::parse_timestamp;
use crate::pipeline::types::FlaggedAlert;
use crate::store::{AlertOrder, Datastore, Session, StoreError, StoredAlert};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Layout used for the `timestamp` column. Sorts lexicographically.
pub const STORAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS high_stress_users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    stress_score REAL NOT NULL,
    "timestamp" TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_high_stress_users_timestamp
    ON high_stress_users ("timestamp");
"#;

const INSERT_ALERT: &str =
    r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES (?1, ?2, ?3)"#;

const SELECT_ALERTS: &str = r#"SELECT user_id, stress_score, "timestamp" FROM high_stress_users"#;

const SELECT_ALERTS_NEWEST_FIRST: &str =
    r#"SELECT user_id, stress_score, "timestamp" FROM high_stress_users ORDER BY "timestamp" DESC"#;

/// Decode a stored `timestamp` cell.
///
/// Offset-bearing values keep their wall-clock time; the offset is dropped,
/// not applied. Rows written by this crate carry no offset.
pub fn decode_stored_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.naive_local());
    }
    parse_timestamp(raw)
}

/// Alert store backed by a SQLite database file.
///
/// Holds no connection of its own; every [`Datastore::connect`] opens a
/// fresh one that lives as long as the returned session. The alert table is
/// created on first connect if it does not exist yet.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Create a store handle without touching the database.
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }

    /// Create a store handle and make sure the alert table exists.
    pub fn open(path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let store = Self::new(path, busy_timeout);
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the alert table and its index if they are missing.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.open_connection()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), "Alert schema ready");
        Ok(())
    }

    fn open_connection(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connect(e.to_string()))?;
            }
        }

        let conn = Connection::open(&self.path).map_err(|e| StoreError::Connect(e.to_string()))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        Ok(conn)
    }
}

impl Datastore for SqliteStore {
    fn connect(&self) -> Result<Box<dyn Session + '_>, StoreError> {
        let conn = self.open_connection()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), "Opened datastore session");
        Ok(Box::new(SqliteSession { conn }))
    }
}

/// A single SQLite connection.
pub struct SqliteSession {
    conn: Connection,
}

impl Session for SqliteSession {
    fn begin(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StoreError::Transaction(format!("begin: {e}")))
    }

    fn insert_alert(&mut self, alert: &FlaggedAlert) -> Result<(), StoreError> {
        let timestamp = alert.timestamp.format(STORAGE_TIMESTAMP_FORMAT).to_string();
        self.conn
            .execute(
                INSERT_ALERT,
                params![alert.user_id, alert.stress_level, timestamp],
            )
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StoreError::Transaction(format!("commit: {e}")))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| StoreError::Transaction(format!("rollback: {e}")))
    }

    fn fetch_alerts(&mut self, order: AlertOrder) -> Result<Vec<StoredAlert>, StoreError> {
        let query = match order {
            AlertOrder::Storage => SELECT_ALERTS,
            AlertOrder::NewestFirst => SELECT_ALERTS_NEWEST_FIRST,
        };

        let mut stmt = self
            .conn
            .prepare(query)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let user_id: String = row.get(0)?;
                let stress_score: f64 = row.get(1)?;
                let timestamp: String = row.get(2)?;
                Ok((user_id, stress_score, timestamp))
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut alerts = Vec::new();
        for row in rows {
            let (user_id, stress_score, raw_timestamp) =
                row.map_err(|e| StoreError::Query(e.to_string()))?;
            let timestamp = decode_stored_timestamp(&raw_timestamp).ok_or_else(|| {
                StoreError::Decode(format!("invalid timestamp '{raw_timestamp}' for {user_id}"))
            })?;
            alerts.push(StoredAlert {
                user_id,
                stress_score,
                timestamp,
            });
        }

        Ok(alerts)
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            tracing::warn!("Session released with an open transaction, rolling back");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("Rollback on release failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 11)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn alert(user_id: &str, stress_level: f64, hour: u32) -> FlaggedAlert {
        FlaggedAlert {
            user_id: user_id.to_string(),
            stress_level,
            timestamp: at(hour),
        }
    }

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("alerts.db"), Duration::from_secs(1)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_insert_and_fetch_round_trip() {
        let (_dir, store) = temp_store();
        let mut session = store.connect().unwrap();

        session.begin().unwrap();
        session.insert_alert(&alert("user_1", 85.0, 12)).unwrap();
        session.commit().unwrap();

        let alerts = session.fetch_alerts(AlertOrder::Storage).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].user_id, "user_1");
        assert_eq!(alerts[0].stress_score, 85.0);
        assert_eq!(alerts[0].timestamp, at(12));
    }

    #[test]
    fn test_newest_first_ordering() {
        let (_dir, store) = temp_store();
        {
            let mut session = store.connect().unwrap();
            session.begin().unwrap();
            session.insert_alert(&alert("early", 80.0, 9)).unwrap();
            session.insert_alert(&alert("late", 75.0, 13)).unwrap();
            session.insert_alert(&alert("middle", 90.0, 11)).unwrap();
            session.commit().unwrap();
        }

        let mut session = store.connect().unwrap();
        let newest: Vec<String> = session
            .fetch_alerts(AlertOrder::NewestFirst)
            .unwrap()
            .into_iter()
            .map(|a| a.user_id)
            .collect();
        assert_eq!(newest, vec!["late", "middle", "early"]);
    }

    #[test]
    fn test_connect_creates_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("nested").join("alerts.db"), Duration::from_secs(1));
        assert!(!store.path().exists());

        let mut session = store.connect().unwrap();
        assert!(session.fetch_alerts(AlertOrder::Storage).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (_dir, store) = temp_store();
        let mut session = store.connect().unwrap();

        session.begin().unwrap();
        session.insert_alert(&alert("user_0", 99.0, 10)).unwrap();
        session.rollback().unwrap();

        assert!(session.fetch_alerts(AlertOrder::Storage).unwrap().is_empty());
    }

    #[test]
    fn test_dropped_session_rolls_back_open_transaction() {
        let (_dir, store) = temp_store();
        {
            let mut session = store.connect().unwrap();
            session.begin().unwrap();
            session.insert_alert(&alert("user_0", 99.0, 10)).unwrap();
        }

        let mut session = store.connect().unwrap();
        assert!(session.fetch_alerts(AlertOrder::Storage).unwrap().is_empty());
    }

    #[test]
    fn test_reads_rows_written_by_other_tools() {
        let (_dir, store) = temp_store();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES (?1, ?2, ?3)"#,
            params!["test_user_1", 85, "2025-06-11T12:00:00Z"],
        )
        .unwrap();

        let mut session = store.connect().unwrap();
        let alerts = session.fetch_alerts(AlertOrder::Storage).unwrap();
        assert_eq!(alerts[0].stress_score, 85.0);
        assert_eq!(alerts[0].timestamp, at(12));
    }

    #[test]
    fn test_offset_timestamps_keep_wall_clock_time() {
        let (_dir, store) = temp_store();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES (?1, ?2, ?3)"#,
            params!["test_user_2", 90, "2025-06-11T12:00:00+02:00"],
        )
        .unwrap();
        conn.execute(
            r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES (?1, ?2, ?3)"#,
            params!["test_user_3", 90, "2025-06-11 12:00:00-05"],
        )
        .unwrap();

        let mut session = store.connect().unwrap();
        let alerts = session.fetch_alerts(AlertOrder::Storage).unwrap();
        assert_eq!(alerts[0].timestamp, at(12));
        assert_eq!(alerts[1].timestamp, at(12));
    }

    #[test]
    fn test_decode_stored_timestamp_formats() {
        assert_eq!(decode_stored_timestamp("2025-06-11T12:00:00"), Some(at(12)));
        assert_eq!(decode_stored_timestamp("2025-06-11T12:00:00Z"), Some(at(12)));
        assert_eq!(decode_stored_timestamp("2025-06-11T12:00:00+02:00"), Some(at(12)));
        assert_eq!(decode_stored_timestamp("yesterday"), None);
    }

    #[test]
    fn test_undecodable_timestamp_is_an_error() {
        let (_dir, store) = temp_store();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            r#"INSERT INTO high_stress_users (user_id, stress_score, "timestamp") VALUES ('u', 80, 'yesterday')"#,
            [],
        )
        .unwrap();

        let mut session = store.connect().unwrap();
        assert!(matches!(
            session.fetch_alerts(AlertOrder::Storage),
            Err(StoreError::Decode(_))
        ));
    }
}
