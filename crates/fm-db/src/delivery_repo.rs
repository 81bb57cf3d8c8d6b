use crate::util::to_rfc3339;
use chrono::{DateTime, Duration, Utc};
use fm_core::deliveries::DeliveryRepository;
use fm_core::error::EventError;
use rusqlite::Connection;
use std::sync::MutexGuard;

pub struct DeliveryRepo<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> DeliveryRepo<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

fn storage(err: impl std::fmt::Display) -> EventError {
    EventError::Storage {
        message: err.to_string(),
    }
}

impl<'a> DeliveryRepository for DeliveryRepo<'a> {
    fn is_processed(&self, delivery_id: &str) -> Result<bool, EventError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM webhook_deliveries WHERE delivery_id = ?1")
            .map_err(storage)?;
        let mut rows = stmt.query([delivery_id]).map_err(storage)?;
        Ok(rows.next().map_err(storage)?.is_some())
    }

    fn mark_processed(
        &self,
        delivery_id: &str,
        now: DateTime<Utc>,
        retention_secs: u64,
    ) -> Result<(), EventError> {
        let secs = i64::try_from(retention_secs).unwrap_or_else(|_| i64::from(u32::MAX));
        let expires_at = now + Duration::seconds(secs);
        self.conn
            .execute(
                "INSERT OR IGNORE INTO webhook_deliveries (delivery_id, processed_at, expires_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![delivery_id, to_rfc3339(&now), to_rfc3339(&expires_at)],
            )
            .map_err(storage)?;
        Ok(())
    }

    fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, EventError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM webhook_deliveries WHERE expires_at < ?1",
                [to_rfc3339(&now)],
            )
            .map_err(storage)?;
        Ok(affected as u64)
    }
}
