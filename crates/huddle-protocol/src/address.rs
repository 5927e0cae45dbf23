//! Topic and destination addressing.
//!
//! Clients subscribe to topics (`public` or `room/{roomId}`) and send to
//! application destinations (`chat/{roomId}/addUser`,
//! `chat/{roomId}/sendMessage`). The room id `public` always refers to the
//! global topic, so `room/public` and `chat/public/...` both resolve to it.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum room id length accepted in an address.
pub const MAX_ROOM_ID_LENGTH: usize = 256;

/// Name of the global topic.
pub const PUBLIC_TOPIC: &str = "public";

const ROOM_PREFIX: &str = "room/";
const CHAT_PREFIX: &str = "chat/";

/// Addressing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Invalid topic string.
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic {
        /// Offending topic.
        topic: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Invalid destination string.
    #[error("Invalid destination '{destination}': {reason}")]
    InvalidDestination {
        /// Offending destination.
        destination: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Validate a room id appearing in an address.
///
/// # Errors
///
/// Returns a reason if the id is invalid.
pub fn validate_room_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("room id cannot be empty");
    }
    if id.len() > MAX_ROOM_ID_LENGTH {
        return Err("room id too long");
    }
    if id.contains('/') {
        return Err("room id cannot contain '/'");
    }
    if !id.chars().all(|c| c.is_ascii() && !c.is_ascii_control() && c != ' ') {
        return Err("room id contains invalid characters");
    }
    Ok(())
}

/// A routing key for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// The global room.
    Public,
    /// A registered room.
    Room(String),
}

impl Topic {
    /// Topic for a room id, mapping `public` to the global topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the room id is invalid.
    pub fn for_room(room_id: &str) -> Result<Self, AddressError> {
        if room_id == PUBLIC_TOPIC {
            return Ok(Topic::Public);
        }
        validate_room_id(room_id).map_err(|reason| AddressError::InvalidTopic {
            topic: format!("{ROOM_PREFIX}{room_id}"),
            reason,
        })?;
        Ok(Topic::Room(room_id.to_string()))
    }

    /// The room id behind this topic, if it is a registered room.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Topic::Public => None,
            Topic::Room(id) => Some(id),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Public => f.write_str(PUBLIC_TOPIC),
            Topic::Room(id) => write!(f, "{ROOM_PREFIX}{id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the broker-style `/topic/` prefix used by STOMP clients
        let s = s.strip_prefix("/topic/").unwrap_or(s);

        if s == PUBLIC_TOPIC {
            return Ok(Topic::Public);
        }

        match s.strip_prefix(ROOM_PREFIX) {
            Some(id) => Topic::for_room(id),
            None => Err(AddressError::InvalidTopic {
                topic: s.to_string(),
                reason: "expected 'public' or 'room/{id}'",
            }),
        }
    }
}

/// What a client asks the server to do at a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Announce entry into the room.
    AddUser,
    /// Publish an event to the room.
    SendMessage,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::AddUser => "addUser",
            Action::SendMessage => "sendMessage",
        }
    }
}

/// A client application destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Topic the destination resolves to.
    pub topic: Topic,
    /// Requested action.
    pub action: Action,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let room = match &self.topic {
            Topic::Public => PUBLIC_TOPIC,
            Topic::Room(id) => id.as_str(),
        };
        write!(f, "{CHAT_PREFIX}{room}/{}", self.action.as_str())
    }
}

impl FromStr for Destination {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| AddressError::InvalidDestination {
            destination: s.to_string(),
            reason,
        };

        // `/app/` is the STOMP application prefix
        let trimmed = s.strip_prefix("/app/").unwrap_or(s);
        let rest = trimmed
            .strip_prefix(CHAT_PREFIX)
            .ok_or_else(|| invalid("expected 'chat/{roomId}/{action}'"))?;
        let (room, action) = rest
            .rsplit_once('/')
            .ok_or_else(|| invalid("missing action"))?;

        let action = match action {
            "addUser" => Action::AddUser,
            "sendMessage" => Action::SendMessage,
            _ => return Err(invalid("unknown action")),
        };

        let topic = Topic::for_room(room).map_err(|_| invalid("invalid room id"))?;
        Ok(Destination { topic, action })
    }
}
