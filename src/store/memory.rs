//! In-process alert store.
//!
//! Keeps committed alerts in a shared vector and counts every call made
//! against it, which makes it useful for dry runs and for asserting exactly
//! how the pipeline talks to its datastore. Faults can be injected on
//! connect or on the K-th insert.

use crate::pipeline::types::FlaggedAlert;
use crate::store::{AlertOrder, Datastore, Session, StoreError, StoredAlert};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Counts of each datastore operation performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCalls {
    pub connects: usize,
    pub begins: usize,
    pub inserts: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub fetches: usize,
    /// Sessions released (dropped)
    pub releases: usize,
}

impl StoreCalls {
    /// Total calls, excluding session releases.
    pub fn total(&self) -> usize {
        self.connects + self.begins + self.inserts + self.commits + self.rollbacks + self.fetches
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    committed: Vec<StoredAlert>,
    calls: StoreCalls,
    refuse_connections: bool,
    /// 1-based insert attempt that fails
    fail_on_insert: Option<usize>,
}

/// Alert store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with committed alerts.
    pub fn with_alerts(alerts: Vec<StoredAlert>) -> Self {
        let store = Self::new();
        store.lock().committed = alerts;
        store
    }

    /// Make every `connect` fail.
    pub fn refuse_connections(self) -> Self {
        self.lock().refuse_connections = true;
        self
    }

    /// Make the `k`-th insert attempt (1-based, counted across sessions) fail.
    pub fn fail_on_insert(self, k: usize) -> Self {
        self.lock().fail_on_insert = Some(k);
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    /// Committed alerts in insertion order.
    pub fn alerts(&self) -> Vec<StoredAlert> {
        self.lock().committed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Datastore for MemoryStore {
    fn connect(&self) -> Result<Box<dyn Session + '_>, StoreError> {
        let mut state = self.lock();
        state.calls.connects += 1;
        if state.refuse_connections {
            return Err(StoreError::Connect("connection refused".to_string()));
        }
        drop(state);

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            pending: None,
        }))
    }
}

/// A session over a [`MemoryStore`].
struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    /// Rows written inside the open transaction, if any
    pending: Option<Vec<StoredAlert>>,
}

impl Session for MemorySession {
    fn begin(&mut self) -> Result<(), StoreError> {
        lock_state(&self.state).calls.begins += 1;
        if self.pending.is_some() {
            return Err(StoreError::Transaction(
                "begin: transaction already open".to_string(),
            ));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn insert_alert(&mut self, alert: &FlaggedAlert) -> Result<(), StoreError> {
        let mut state = lock_state(&self.state);
        state.calls.inserts += 1;
        if state.fail_on_insert == Some(state.calls.inserts) {
            return Err(StoreError::Write(format!(
                "injected failure on insert {}",
                state.calls.inserts
            )));
        }

        match self.pending.as_mut() {
            Some(pending) => pending.push(StoredAlert::from(alert)),
            None => state.committed.push(StoredAlert::from(alert)),
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = lock_state(&self.state);
        state.calls.commits += 1;
        let pending = self
            .pending
            .take()
            .ok_or_else(|| StoreError::Transaction("commit: no open transaction".to_string()))?;
        state.committed.extend(pending);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        lock_state(&self.state).calls.rollbacks += 1;
        self.pending = None;
        Ok(())
    }

    fn fetch_alerts(&mut self, order: AlertOrder) -> Result<Vec<StoredAlert>, StoreError> {
        let mut state = lock_state(&self.state);
        state.calls.fetches += 1;
        let mut alerts = state.committed.clone();
        if order == AlertOrder::NewestFirst {
            alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        Ok(alerts)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        lock_state(&self.state).calls.releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn alert(user_id: &str, hour: u32) -> FlaggedAlert {
        FlaggedAlert {
            user_id: user_id.to_string(),
            stress_level: 80.0,
            timestamp: NaiveDate::from_ymd_opt(2025, 6, 11)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_commit_publishes_pending_rows() {
        let store = MemoryStore::new();
        {
            let mut session = store.connect().unwrap();
            session.begin().unwrap();
            session.insert_alert(&alert("a", 10)).unwrap();
            assert!(store.alerts().is_empty());
            session.commit().unwrap();
        }

        assert_eq!(store.alerts().len(), 1);
        let calls = store.calls();
        assert_eq!(calls.connects, 1);
        assert_eq!(calls.commits, 1);
        assert_eq!(calls.releases, 1);
    }

    #[test]
    fn test_drop_without_commit_discards_rows() {
        let store = MemoryStore::new();
        {
            let mut session = store.connect().unwrap();
            session.begin().unwrap();
            session.insert_alert(&alert("a", 10)).unwrap();
        }
        assert!(store.alerts().is_empty());
    }

    #[test]
    fn test_injected_insert_failure() {
        let store = MemoryStore::new().fail_on_insert(2);
        let mut session = store.connect().unwrap();
        session.begin().unwrap();

        assert!(session.insert_alert(&alert("a", 10)).is_ok());
        assert!(matches!(
            session.insert_alert(&alert("b", 11)),
            Err(StoreError::Write(_))
        ));
    }

    #[test]
    fn test_refused_connection_is_counted() {
        let store = MemoryStore::new().refuse_connections();
        assert!(store.connect().is_err());
        assert_eq!(store.calls().connects, 1);
        assert_eq!(store.calls().releases, 0);
    }

    #[test]
    fn test_newest_first_sorts_by_timestamp() {
        let store = MemoryStore::with_alerts(vec![
            StoredAlert::from(&alert("early", 9)),
            StoredAlert::from(&alert("late", 14)),
        ]);
        let mut session = store.connect().unwrap();

        let alerts = session.fetch_alerts(AlertOrder::NewestFirst).unwrap();
        assert_eq!(alerts[0].user_id, "late");
    }
}
