use tokio::sync::broadcast;

use crate::config::EventsConfig;
use crate::types::FlowEvent;

/// Broadcast bus for workflow lifecycle notifications.
///
/// Publishing never waits on subscribers. A subscriber that falls more than
/// `capacity` events behind loses the oldest ones.
pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Publish to current subscribers. Returns how many received it.
    pub fn publish(&self, event: FlowEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::from_config(&EventsConfig::default())
    }
}
