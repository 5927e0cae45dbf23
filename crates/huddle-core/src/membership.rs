//! Membership manager.
//!
//! Enforces the join/leave state machine for (room, username) pairs and the
//! capacity invariant `0 <= current_members <= max_members`. Every mutation
//! runs under the room's exclusive registry lock, and the resulting JOIN or
//! LEAVE event is published before the lock is released, so subscribers see
//! membership events in the order the membership changed.

use crate::broker::TopicBroker;
use crate::error::LobbyError;
use crate::registry::{Room, RoomRegistry};
use huddle_protocol::{ChatEvent, Topic};
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum username length in characters.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Sender used for server-originated notices.
pub const SYSTEM_SENDER: &str = "System";

/// Validate a username.
///
/// # Errors
///
/// Returns `InvalidUsername` for a blank or overlong username.
pub fn validate_username(username: &str) -> Result<(), LobbyError> {
    if username.trim().is_empty() {
        return Err(LobbyError::InvalidUsername("username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(LobbyError::InvalidUsername("username too long"));
    }
    Ok(())
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReceipt {
    /// Room state after the join.
    pub room: Room,
    /// `false` if the user was already a member and nothing changed.
    pub is_new: bool,
}

/// The membership manager.
pub struct MembershipManager {
    registry: Arc<RoomRegistry>,
    broker: Arc<TopicBroker>,
}

impl MembershipManager {
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>, broker: Arc<TopicBroker>) -> Self {
        Self { registry, broker }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<TopicBroker> {
        &self.broker
    }

    /// Add `username` to a room and broadcast JOIN on the room topic.
    ///
    /// Joining a room the user is already in is a no-op that succeeds with
    /// `is_new == false` and broadcasts nothing.
    ///
    /// # Errors
    ///
    /// `InvalidUsername`, `RoomNotFound`, or `RoomFull`.
    pub fn join(&self, room_id: &str, username: &str) -> Result<JoinReceipt, LobbyError> {
        validate_username(username)?;

        self.registry.with_room_mut(room_id, |record| {
            if record.members.contains(username) {
                debug!(room = %room_id, user = %username, "Already a member");
                return Ok(JoinReceipt {
                    room: record.snapshot(),
                    is_new: false,
                });
            }

            if record.members.len() >= record.max_members {
                debug!(room = %room_id, user = %username, "Join rejected: room full");
                return Err(LobbyError::RoomFull {
                    room: record.id.clone(),
                    capacity: record.max_members,
                });
            }

            record.members.insert(username.to_string());
            let recipients = self
                .broker
                .publish(&room_topic(room_id), ChatEvent::join(username), None);

            info!(
                room = %room_id,
                user = %username,
                members = record.members.len(),
                recipients,
                "Member joined"
            );

            Ok(JoinReceipt {
                room: record.snapshot(),
                is_new: true,
            })
        })
    }

    /// Remove `username` from a room and broadcast LEAVE on the room topic.
    ///
    /// # Errors
    ///
    /// `InvalidUsername`, `RoomNotFound`, or `NotMember`.
    pub fn leave(&self, room_id: &str, username: &str) -> Result<Room, LobbyError> {
        validate_username(username)?;

        self.registry.with_room_mut(room_id, |record| {
            if !record.members.remove(username) {
                return Err(LobbyError::NotMember {
                    room: record.id.clone(),
                    username: username.to_string(),
                });
            }

            let recipients = self
                .broker
                .publish(&room_topic(room_id), ChatEvent::leave(username), None);

            info!(
                room = %room_id,
                user = %username,
                members = record.members.len(),
                recipients,
                "Member left"
            );

            Ok(record.snapshot())
        })
    }

    /// Delete a room, dropping all memberships, and tell its subscribers.
    ///
    /// # Errors
    ///
    /// `RoomNotFound`.
    pub fn close_room(&self, room_id: &str) -> Result<Room, LobbyError> {
        let room = self.registry.delete_room(room_id)?;
        self.broker.publish(
            &room_topic(room_id),
            ChatEvent::system(SYSTEM_SENDER, format!("Room {} was closed", room.name)),
            None,
        );
        info!(room = %room_id, dropped = room.current_members, "Room closed");
        Ok(room)
    }

    /// Check whether `username` is in the room.
    #[must_use]
    pub fn is_member(&self, room_id: &str, username: &str) -> bool {
        self.registry
            .get_room(room_id)
            .map(|room| room.members.iter().any(|m| m == username))
            .unwrap_or(false)
    }
}

fn room_topic(room_id: &str) -> Topic {
    Topic::Room(room_id.to_string())
}
