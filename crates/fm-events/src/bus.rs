use crate::types::EventRecord;
use tokio::sync::broadcast;

/// Broadcast fan-out for committed events. The bus is best-effort: the
/// durable log in the store is the source of truth, and a subscriber that
/// lags past `capacity` reconnects and replays from its last seen seq.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Publishes to current subscribers, returning how many received it.
    /// Zero subscribers is not an error.
    pub fn publish(&self, event: EventRecord) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventSource;
    use chrono::Utc;

    fn record(seq: i64) -> EventRecord {
        EventRecord {
            id: format!("evt_{seq}"),
            seq,
            at: Utc::now(),
            correlation_id: None,
            source: EventSource::Rest,
            body: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(record(1)), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(record(7)), 1);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.seq, 7);
    }
}
