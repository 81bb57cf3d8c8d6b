use crate::error::EventError;
use fm_events::types::EventRecord;

pub trait EventRepository {
    fn append(&self, event: EventRecord) -> Result<EventRecord, EventError>;
    fn list(&self, after: Option<i64>, limit: Option<u32>) -> Result<Vec<EventRecord>, EventError>;
}
