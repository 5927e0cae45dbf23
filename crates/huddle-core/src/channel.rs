//! Per-topic fan-out channel.
//!
//! A topic channel owns one bounded broadcast ring. Every subscriber gets
//! its own receiver, so all subscribers see events in the same order and
//! a subscriber that falls behind only loses its own oldest events.

use crate::message::Delivery;
use huddle_protocol::Topic;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast capacity per topic.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// A topic with its subscribers.
#[derive(Debug)]
pub struct TopicChannel {
    topic: Topic,
    sender: broadcast::Sender<Arc<Delivery>>,
    subscribers: HashSet<String>,
}

impl TopicChannel {
    /// Create a new topic channel.
    #[must_use]
    pub fn new(topic: Topic) -> Self {
        Self::with_capacity(topic, DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a new topic channel with a specific capacity.
    #[must_use]
    pub fn with_capacity(topic: Topic, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            topic,
            sender,
            subscribers: HashSet::new(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, connection_id: &str) -> bool {
        self.subscribers.contains(connection_id)
    }

    /// Subscribe a connection, returning its receiver.
    pub fn subscribe(
        &mut self,
        connection_id: impl Into<String>,
    ) -> broadcast::Receiver<Arc<Delivery>> {
        let conn_id = connection_id.into();
        debug!(topic = %self.topic, connection = %conn_id, "Connection subscribed");
        self.subscribers.insert(conn_id);
        self.sender.subscribe()
    }

    /// Unsubscribe a connection.
    ///
    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&mut self, connection_id: &str) -> bool {
        let removed = self.subscribers.remove(connection_id);
        if removed {
            debug!(topic = %self.topic, connection = %connection_id, "Connection unsubscribed");
        }
        removed
    }

    /// Publish a delivery to every live receiver.
    ///
    /// Returns the number of receivers that got it. Publishing with no
    /// receivers drops the delivery and returns 0.
    pub fn publish(&self, delivery: Delivery) -> usize {
        trace!(topic = %self.topic, id = delivery.id, "Publishing event");
        self.sender.send(Arc::new(delivery)).unwrap_or_default()
    }

    /// Check if the topic has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
