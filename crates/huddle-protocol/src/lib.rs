//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat service.
//!
//! - [`ChatEvent`] / [`EventKind`] - the events rooms carry
//! - [`Topic`] / [`Destination`] - where clients subscribe and send
//! - [`Frame`] - the messages exchanged over a real-time connection
//! - [`codec`] - JSON text and MessagePack binary encodings
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ChatEvent, Frame};
//!
//! let frame = Frame::send("chat/public/sendMessage", ChatEvent::chat("userA", "gl hf"));
//!
//! let text = codec::encode_text(&frame).unwrap();
//! let decoded = codec::decode_text(&text).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod address;
pub mod codec;
pub mod event;
pub mod frames;
pub mod version;

pub use address::{Action, AddressError, Destination, Topic};
pub use codec::{decode, encode, Encoded, Encoding, ProtocolError};
pub use event::{ChatEvent, EventKind};
pub use frames::{codes, Frame, FrameType};
pub use version::{Version, VersionMismatch, PROTOCOL_VERSION};
