//! Transactional alert writer.

use crate::pipeline::types::FlaggedAlert;
use crate::store::{Session, StoreError};

/// Writes a batch of alerts inside one transaction.
///
/// All-or-nothing: every row is inserted in order and committed once after
/// the last one. If any insert fails the transaction is rolled back and the
/// failure returned. The writer never retries.
pub struct AlertWriter<'s, S: Session + ?Sized> {
    session: &'s mut S,
}

impl<'s, S: Session + ?Sized> AlertWriter<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Self { session }
    }

    /// Persist `alerts` and return how many rows were committed.
    pub fn write(&mut self, alerts: &[FlaggedAlert]) -> Result<usize, StoreError> {
        if alerts.is_empty() {
            return Ok(0);
        }

        self.session.begin()?;

        for (index, alert) in alerts.iter().enumerate() {
            if let Err(e) = self.session.insert_alert(alert) {
                tracing::error!(
                    row = index,
                    user_id = %alert.user_id,
                    "Insert failed, rolling back: {}",
                    e
                );
                self.rollback_quietly();
                return Err(e);
            }
        }

        if let Err(e) = self.session.commit() {
            tracing::error!("Commit failed, rolling back: {}", e);
            self.rollback_quietly();
            return Err(e);
        }

        tracing::info!("Inserted {} alerts", alerts.len());
        Ok(alerts.len())
    }

    fn rollback_quietly(&mut self) {
        if let Err(e) = self.session.rollback() {
            tracing::warn!("Rollback failed: {}", e);
        }
    }
}
