//! In-process event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;
use tracing::debug;

use crate::collaborators::{BusEvent, EventBus};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BusEvent>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: BusEvent) {
        let topic = event.topic();
        // No subscribers is not an error for a pub/sub channel.
        match self.tx.send(event) {
            Ok(receivers) => debug!(topic, receivers, "bus event published"),
            Err(_) => debug!(topic, "bus event published with no subscribers"),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::InvestigationFlag;

    fn flag(id: &str) -> InvestigationFlag {
        serde_json::from_value(serde_json::json!({ "id": id })).unwrap()
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = BroadcastBus::new();
        let mut rx = bus.subscribe();
        bus.publish(BusEvent::ReturnToPending(flag("7")));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "return-to-pending");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = BroadcastBus::new();
        bus.publish(BusEvent::InvestigateFlag(flag("1")));
    }
}
