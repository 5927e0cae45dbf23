//! Frame types for the Huddle protocol.
//!
//! Frames are the messages exchanged over a real-time connection. Browser
//! clients exchange them as JSON text, native clients as MessagePack.

use serde::{Deserialize, Serialize};

use crate::event::ChatEvent;
use crate::version::Version;

/// Error codes carried by [`Frame::Error`].
pub mod codes {
    /// The frame could not be decoded or is not valid from a client.
    pub const INVALID_FRAME: u16 = 1001;
    /// Subscription was refused.
    pub const SUBSCRIBE_FAILED: u16 = 1002;
    /// The addressed room does not exist.
    pub const ROOM_NOT_FOUND: u16 = 1003;
    /// The room is at capacity.
    pub const ROOM_FULL: u16 = 1004;
    /// Not a member of the room, or not subscribed to the topic.
    pub const NOT_MEMBER: u16 = 1005;
    /// The event is not acceptable at this destination.
    pub const INVALID_EVENT: u16 = 1006;
    /// The client speaks an incompatible protocol version.
    pub const UNSUPPORTED_VERSION: u16 = 1007;
    /// The username is missing or malformed.
    pub const INVALID_USERNAME: u16 = 1008;
}

/// Frame discriminant, used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Event,
    Ack,
    Error,
    Ping,
    Pong,
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client handshake announcing its protocol version.
    Connect {
        /// Client protocol version.
        version: Version,
    },

    /// Server greeting sent once the connection is accepted.
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Version agreed for this session.
        version: Version,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Subscribe to a topic.
    Subscribe {
        /// Request ID for acknowledgment.
        id: u64,
        /// Topic (`public` or `room/{id}`).
        topic: String,
    },

    /// Unsubscribe from a topic.
    Unsubscribe {
        /// Request ID for acknowledgment.
        id: u64,
        /// Topic to leave.
        topic: String,
    },

    /// Send an event to an application destination.
    Send {
        /// Optional request ID; an ack or error is only sent when present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Destination such as `chat/{roomId}/sendMessage`.
        destination: String,
        /// The event.
        event: ChatEvent,
    },

    /// An event delivered on a subscribed topic.
    Event {
        /// Topic the event was published to.
        topic: String,
        /// The event, verbatim.
        event: ChatEvent,
    },

    /// Acknowledgment of a request.
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Error response.
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code, see [`codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Connect { .. } => FrameType::Connect,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::Subscribe { .. } => FrameType::Subscribe,
            Frame::Unsubscribe { .. } => FrameType::Unsubscribe,
            Frame::Send { .. } => FrameType::Send,
            Frame::Event { .. } => FrameType::Event,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
        }
    }

    /// Create a Connect frame.
    #[must_use]
    pub fn connect(version: Version) -> Self {
        Frame::Connect { version }
    }

    /// Create a Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: Version, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }

    /// Create a Subscribe frame.
    #[must_use]
    pub fn subscribe(id: u64, topic: impl Into<String>) -> Self {
        Frame::Subscribe {
            id,
            topic: topic.into(),
        }
    }

    /// Create an Unsubscribe frame.
    #[must_use]
    pub fn unsubscribe(id: u64, topic: impl Into<String>) -> Self {
        Frame::Unsubscribe {
            id,
            topic: topic.into(),
        }
    }

    /// Create a Send frame without acknowledgment.
    #[must_use]
    pub fn send(destination: impl Into<String>, event: ChatEvent) -> Self {
        Frame::Send {
            id: None,
            destination: destination.into(),
            event,
        }
    }

    /// Create a Send frame that requests acknowledgment.
    #[must_use]
    pub fn send_with_ack(id: u64, destination: impl Into<String>, event: ChatEvent) -> Self {
        Frame::Send {
            id: Some(id),
            destination: destination.into(),
            event,
        }
    }

    /// Create an Event frame.
    #[must_use]
    pub fn event(topic: impl Into<String>, event: ChatEvent) -> Self {
        Frame::Event {
            topic: topic.into(),
            event,
        }
    }

    /// Create an Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_frame_type() {
        let subscribe = Frame::subscribe(1, "public");
        assert_eq!(subscribe.frame_type(), FrameType::Subscribe);

        let send = Frame::send("chat/public/sendMessage", ChatEvent::chat("a", "b"));
        assert_eq!(send.frame_type(), FrameType::Send);
    }

    #[test]
    fn test_send_frame_from_browser_json() {
        let json = r#"{
            "type": "send",
            "destination": "chat/abc/sendMessage",
            "event": {"sender": "userA", "content": "gg", "type": "CHALLENGE"}
        }"#;

        let frame: Frame = serde_json::from_str(json).unwrap();
        match frame {
            Frame::Send {
                id,
                destination,
                event,
            } => {
                assert_eq!(id, None);
                assert_eq!(destination, "chat/abc/sendMessage");
                assert_eq!(event.kind, EventKind::Challenge);
            }
            other => panic!("Expected Send frame, got {other:?}"),
        }
    }

    #[test]
    fn test_event_frame_json() {
        let frame = Frame::event("room/abc", ChatEvent::join("userA"));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["topic"], "room/abc");
        assert_eq!(json["event"]["type"], "JOIN");
        assert_eq!(json["event"]["sender"], "userA");
    }

    #[test]
    fn test_ping_without_timestamp() {
        let frame: Frame = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(frame, Frame::ping());
    }
}
