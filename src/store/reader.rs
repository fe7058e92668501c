//! Alert read path and external formatting.

use crate::store::{AlertOrder, Datastore, StoreError, StoredAlert};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Layout for rendered timestamps; a literal `Z` is appended.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// An alert as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    pub user_id: String,
    /// Stress score as a fraction (85 -> 0.85)
    pub stress_score: f64,
    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,
}

/// Rescale a stored score to a fraction.
///
/// The stored value is truncated toward zero before dividing by 100.
pub fn scale_score(raw: f64) -> f64 {
    raw.trunc() / 100.0
}

/// Render a timestamp with a trailing `Z`.
///
/// This is a formatting convention only: no timezone conversion happens
/// and sub-second precision is dropped.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    format!("{}Z", timestamp.format(TIMESTAMP_FORMAT))
}

/// Format one stored alert for output.
pub fn format_alert(alert: &StoredAlert) -> AlertView {
    AlertView {
        user_id: alert.user_id.clone(),
        stress_score: scale_score(alert.stress_score),
        timestamp: format_timestamp(&alert.timestamp),
    }
}

/// Reads and formats stored alerts.
///
/// Each call opens its own session and releases it before returning; there
/// is no caching, so every call reflects the datastore at query time.
pub struct AlertReader<'a> {
    store: &'a dyn Datastore,
}

impl<'a> AlertReader<'a> {
    pub fn new(store: &'a dyn Datastore) -> Self {
        Self { store }
    }

    /// Fetch every alert in the requested order.
    pub fn fetch(&self, order: AlertOrder) -> Result<Vec<AlertView>, StoreError> {
        let mut session = self.store.connect()?;
        let stored = session.fetch_alerts(order)?;
        let alerts: Vec<AlertView> = stored.iter().map(format_alert).collect();
        tracing::info!("Successfully fetched {} alerts", alerts.len());
        Ok(alerts)
    }
}
