//! Chat events carried on room topics.
//!
//! An event is the unit clients publish and receive. Its JSON form is
//! `{"sender": "...", "content": "...", "type": "CHAT"}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a chat event.
///
/// This is a closed set: unknown kinds are rejected when a frame is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A user entered the room.
    Join,
    /// A user left the room.
    Leave,
    /// Plain chat text.
    Chat,
    /// Server or client notice.
    System,
    /// A game challenge addressed to the room.
    Challenge,
}

impl EventKind {
    /// Whether clients may publish this kind directly.
    ///
    /// JOIN and LEAVE are only produced by membership changes.
    #[must_use]
    pub fn is_client_publishable(self) -> bool {
        match self {
            EventKind::Chat | EventKind::System | EventKind::Challenge => true,
            EventKind::Join | EventKind::Leave => false,
        }
    }

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Join => "JOIN",
            EventKind::Leave => "LEAVE",
            EventKind::Chat => "CHAT",
            EventKind::System => "SYSTEM",
            EventKind::Challenge => "CHALLENGE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Username of the originator.
    pub sender: String,
    /// Free-text payload, absent for JOIN/LEAVE.
    #[serde(default)]
    pub content: Option<String>,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
}

impl ChatEvent {
    /// Create a JOIN event for `sender`.
    #[must_use]
    pub fn join(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: None,
            kind: EventKind::Join,
        }
    }

    /// Create a LEAVE event for `sender`.
    #[must_use]
    pub fn leave(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: None,
            kind: EventKind::Leave,
        }
    }

    /// Create a CHAT event.
    #[must_use]
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: Some(content.into()),
            kind: EventKind::Chat,
        }
    }

    /// Create a SYSTEM event.
    #[must_use]
    pub fn system(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: Some(content.into()),
            kind: EventKind::System,
        }
    }

    /// Length of the content in bytes (0 when absent).
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.content.as_deref().map_or(0, str::len)
    }
}
