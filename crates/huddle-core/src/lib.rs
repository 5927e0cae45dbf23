//! # huddle-core
//!
//! Rooms, membership and topic fan-out for the Huddle chat service.
//!
//! - **RoomRegistry** - authoritative store of rooms and their member sets
//! - **MembershipManager** - join/leave state machine and capacity invariant
//! - **TopicBroker** - pub/sub fan-out of chat events to topic subscribers
//! - **Delivery** - envelope of an event in flight
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  join/leave  ┌──────────────┐
//! │  Membership  │─────────────▶│   Registry   │
//! └──────────────┘              └──────────────┘
//!        │ JOIN / LEAVE
//!        ▼
//! ┌──────────────┐   fan-out    ┌──────────────┐
//! │    Broker    │─────────────▶│ TopicChannel │──▶ subscribers
//! └──────────────┘              └──────────────┘
//! ```

pub mod broker;
pub mod channel;
pub mod connection;
pub mod error;
pub mod membership;
pub mod message;
pub mod registry;

pub use broker::{BrokerConfig, BrokerError, BrokerStats, TopicBroker};
pub use channel::TopicChannel;
pub use connection::ConnectionId;
pub use error::LobbyError;
pub use membership::{JoinReceipt, MembershipManager};
pub use message::{Delivery, MessageId};
pub use registry::{RegistryConfig, Room, RoomRegistry};
