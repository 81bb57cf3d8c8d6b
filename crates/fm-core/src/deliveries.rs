use crate::error::EventError;
use chrono::{DateTime, Utc};

/// Webhook delivery dedup. A marked delivery stays visible for the
/// retention window so redeliveries inside it are discarded; `cleanup`
/// drops expired markers.
pub trait DeliveryRepository {
    fn is_processed(&self, delivery_id: &str) -> Result<bool, EventError>;
    fn mark_processed(
        &self,
        delivery_id: &str,
        now: DateTime<Utc>,
        retention_secs: u64,
    ) -> Result<(), EventError>;
    fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, EventError>;
}
