//! Shared fixtures for the Huddle benchmarks.

use huddle_core::{Delivery, MembershipManager, Room, RoomRegistry, TopicBroker};
use huddle_protocol::Topic;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A membership manager over a fresh registry and broker.
#[must_use]
pub fn manager() -> Arc<MembershipManager> {
    Arc::new(MembershipManager::new(
        Arc::new(RoomRegistry::new()),
        Arc::new(TopicBroker::new()),
    ))
}

/// Create `count` rooms of the given capacity.
#[must_use]
pub fn rooms(members: &MembershipManager, count: usize, capacity: i64) -> Vec<Room> {
    (0..count)
        .filter_map(|i| {
            members
                .registry()
                .create_room(&format!("room-{i}"), capacity, "bench")
                .ok()
        })
        .collect()
}

/// Subscribe `count` connections to `topic`, returning their receivers.
#[must_use]
pub fn subscribers(
    broker: &TopicBroker,
    topic: &Topic,
    count: usize,
) -> Vec<broadcast::Receiver<Arc<Delivery>>> {
    (0..count)
        .filter_map(|i| broker.subscribe(&format!("conn-{i}"), topic).ok())
        .collect()
}
