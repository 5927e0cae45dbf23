//! Topic broker.
//!
//! The broker manages topic channels and fans published events out to every
//! connection currently subscribed to a topic. There is no durable queue:
//! an event published to a topic nobody listens on is dropped.

use crate::channel::TopicChannel;
use crate::message::Delivery;
use dashmap::{DashMap, DashSet};
use huddle_protocol::{ChatEvent, Topic};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Broker errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Already subscribed to topic.
    #[error("Already subscribed to topic: {0}")]
    AlreadySubscribed(String),

    /// Maximum subscriptions reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,

    /// Maximum number of live topics reached.
    #[error("Too many active topics")]
    TooManyTopics,
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum number of live topics.
    pub max_topics: usize,
    /// Maximum subscriptions per connection.
    pub max_subscriptions_per_connection: usize,
    /// Broadcast ring capacity per topic.
    pub topic_capacity: usize,
    /// Whether to drop topics once their last subscriber leaves.
    pub auto_delete_empty_topics: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_topics: 10_000,
            max_subscriptions_per_connection: 100,
            topic_capacity: 1024,
            auto_delete_empty_topics: true,
        }
    }
}

/// The topic broker.
pub struct TopicBroker {
    /// Live topics.
    topics: DashMap<Topic, TopicChannel>,
    /// Connection subscriptions (connection_id -> topics).
    subscriptions: DashMap<String, DashSet<Topic>>,
    config: BrokerConfig,
}

impl TopicBroker {
    /// Create a new broker with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a new broker with custom configuration.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        info!("Creating topic broker with config: {:?}", config);
        Self {
            topics: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            topic_count: self.topics.len(),
            connection_count: self.subscriptions.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }

    /// Subscribe a connection to a topic.
    ///
    /// Returns a receiver for every event published to the topic from now on.
    ///
    /// # Errors
    ///
    /// Returns an error if already subscribed or a limit is exceeded.
    pub fn subscribe(
        &self,
        connection_id: &str,
        topic: &Topic,
    ) -> Result<broadcast::Receiver<Arc<Delivery>>, BrokerError> {
        let conn_subs = self
            .subscriptions
            .entry(connection_id.to_string())
            .or_default();

        let refused = if conn_subs.contains(topic) {
            Some(BrokerError::AlreadySubscribed(topic.to_string()))
        } else if conn_subs.len() >= self.config.max_subscriptions_per_connection {
            Some(BrokerError::MaxSubscriptionsReached)
        } else if !self.topics.contains_key(topic) && self.topics.len() >= self.config.max_topics {
            Some(BrokerError::TooManyTopics)
        } else {
            None
        };

        if let Some(err) = refused {
            // A refused first subscribe must not leave an empty entry behind
            drop(conn_subs);
            self.subscriptions
                .remove_if(connection_id, |_, subs| subs.is_empty());
            return Err(err);
        }

        let mut entry = self.topics.entry(topic.clone()).or_insert_with(|| {
            debug!(topic = %topic, "Creating new topic");
            TopicChannel::with_capacity(topic.clone(), self.config.topic_capacity)
        });

        let receiver = entry.subscribe(connection_id);
        conn_subs.insert(topic.clone());

        debug!(
            topic = %topic,
            connection = %connection_id,
            subscribers = entry.subscriber_count(),
            "Subscribed"
        );

        Ok(receiver)
    }

    /// Unsubscribe a connection from a topic.
    ///
    /// Returns `false` if the connection was not subscribed.
    pub fn unsubscribe(&self, connection_id: &str, topic: &Topic) -> bool {
        let removed = self
            .subscriptions
            .get(connection_id)
            .map(|subs| subs.remove(topic).is_some())
            .unwrap_or(false);

        if !removed {
            trace!(topic = %topic, connection = %connection_id, "Unsubscribe without subscription");
            return false;
        }

        self.subscriptions
            .remove_if(connection_id, |_, subs| subs.is_empty());
        self.detach(connection_id, topic);
        true
    }

    /// Unsubscribe a connection from all topics.
    ///
    /// Returns the topics the connection was subscribed to.
    pub fn unsubscribe_all(&self, connection_id: &str) -> Vec<Topic> {
        let topics: Vec<Topic> = self
            .subscriptions
            .remove(connection_id)
            .map(|(_, subs)| subs.into_iter().collect())
            .unwrap_or_default();

        for topic in &topics {
            self.detach(connection_id, topic);
        }

        debug!(connection = %connection_id, count = topics.len(), "Unsubscribed from all topics");
        topics
    }

    fn detach(&self, connection_id: &str, topic: &Topic) {
        if let Some(mut entry) = self.topics.get_mut(topic) {
            entry.unsubscribe(connection_id);
        }

        if self.config.auto_delete_empty_topics
            && self
                .topics
                .remove_if(topic, |_, channel| channel.is_empty())
                .is_some()
        {
            debug!(topic = %topic, "Deleted empty topic");
        }
    }

    /// Publish an event to a topic.
    ///
    /// Returns the number of subscribers that received it; a topic without
    /// subscribers yields 0.
    pub fn publish(&self, topic: &Topic, event: ChatEvent, source: Option<&str>) -> usize {
        let mut delivery = Delivery::new(topic.clone(), event);
        if let Some(source) = source {
            delivery = delivery.with_source(source);
        }
        self.publish_delivery(delivery)
    }

    /// Publish a prepared delivery.
    pub fn publish_delivery(&self, delivery: Delivery) -> usize {
        let topic = delivery.topic.clone();
        match self.topics.get(&topic) {
            Some(channel) => {
                let count = channel.publish(delivery);
                trace!(topic = %topic, recipients = count, "Published event");
                count
            }
            None => {
                trace!(topic = %topic, "Publish to topic without subscribers");
                0
            }
        }
    }

    #[must_use]
    pub fn topic_exists(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic)
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(topic)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    /// Get the topics a connection is subscribed to.
    #[must_use]
    pub fn connection_topics(&self, connection_id: &str) -> Vec<Topic> {
        self.subscriptions
            .get(connection_id)
            .map(|s| s.iter().map(|t| t.key().clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for TopicBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Broker statistics.
#[derive(Debug, Clone)]
pub struct BrokerStats {
    /// Number of live topics.
    pub topic_count: usize,
    /// Number of connections with at least one subscription.
    pub connection_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
}
