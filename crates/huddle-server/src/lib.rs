//! # huddle-server
//!
//! HTTP and WebSocket front end for Huddle.
//!
//! - `/api/chat/rooms` - polling lobby API (list, create, join, leave, delete)
//! - `/ws` - realtime channel: topic subscriptions, chat events, presence
//! - `/health` - liveness and basic counts
//!
//! Realtime clients are driven through the [`SessionGateway`], which owns no
//! per-client state: each connection task holds its own [`Session`].

pub mod api;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod server;
pub mod ws;

pub use config::Config;
pub use gateway::{GatewayConfig, GatewayError, Session, SessionGateway};
pub use server::{router, run_server, serve, AppState};
