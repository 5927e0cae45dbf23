//! Delivery envelope for events routed through the broker.

use huddle_protocol::{ChatEvent, Topic};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique, increasing message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// An event on its way to the subscribers of a topic.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Unique message identifier.
    pub id: MessageId,
    /// Topic the event was published to.
    pub topic: Topic,
    /// The event itself.
    pub event: ChatEvent,
    /// Publishing connection, `None` for server-originated events.
    pub source: Option<String>,
    /// Publish time in milliseconds.
    pub timestamp: u64,
}

impl Delivery {
    /// Create a new delivery.
    #[must_use]
    pub fn new(topic: Topic, event: ChatEvent) -> Self {
        Self {
            id: generate_message_id(),
            topic,
            event,
            source: None,
            timestamp: now_millis(),
        }
    }

    /// Attach the publishing connection.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_creation() {
        let delivery = Delivery::new(Topic::Public, ChatEvent::chat("userA", "hi"))
            .with_source("conn-1");
        assert_eq!(delivery.topic, Topic::Public);
        assert_eq!(delivery.source.as_deref(), Some("conn-1"));
        assert!(delivery.timestamp > 0);
    }

    #[test]
    fn test_message_ids_increase() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert!(id2 > id1);
    }
}
