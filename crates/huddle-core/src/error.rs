//! Errors raised by the room registry and membership manager.

use thiserror::Error;

/// Lobby errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// Requested capacity is outside the accepted range.
    #[error("Invalid capacity {requested}: must be between 1 and {max}")]
    InvalidCapacity {
        /// Capacity the caller asked for.
        requested: i64,
        /// Largest accepted capacity.
        max: usize,
    },

    /// Room name rejected.
    #[error("Invalid room name: {0}")]
    InvalidName(&'static str),

    /// Username rejected.
    #[error("Invalid username: {0}")]
    InvalidUsername(&'static str),

    /// No room with this id.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room is at capacity.
    #[error("Room {room} is full ({capacity} members)")]
    RoomFull {
        /// Room id.
        room: String,
        /// Room capacity.
        capacity: usize,
    },

    /// The user is not in the room.
    #[error("{username} is not a member of room {room}")]
    NotMember {
        /// Room id.
        room: String,
        /// Username.
        username: String,
    },
}

impl LobbyError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::InvalidCapacity { .. } => "invalid_capacity",
            LobbyError::InvalidName(_) => "invalid_name",
            LobbyError::InvalidUsername(_) => "invalid_username",
            LobbyError::RoomNotFound(_) => "room_not_found",
            LobbyError::RoomFull { .. } => "room_full",
            LobbyError::NotMember { .. } => "not_member",
        }
    }
}
