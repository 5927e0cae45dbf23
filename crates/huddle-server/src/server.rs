//! Server assembly: shared state, routes, and the listener.

use crate::api;
use crate::config::Config;
use crate::gateway::{GatewayConfig, SessionGateway};
use crate::metrics;
use crate::ws;
use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use huddle_core::{LobbyError, MembershipManager, Room, RoomRegistry, TopicBroker};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Membership manager, with the registry and broker it drives.
    pub members: Arc<MembershipManager>,
    pub gateway: SessionGateway,
    pub config: Config,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(config.registry_config()));
        let broker = Arc::new(TopicBroker::with_config(config.broker_config()));
        let members = Arc::new(MembershipManager::new(registry, broker));
        let gateway = SessionGateway::new(members.clone(), GatewayConfig::from(&config));

        Self {
            members,
            gateway,
            config,
        }
    }

    /// Create the configured default room, if seeding is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured room is invalid.
    pub fn seed_lobby(&self) -> Result<Option<Room>, LobbyError> {
        if !self.config.lobby.seed_default_room {
            return Ok(None);
        }
        let seed = &self.config.lobby.default_room;
        let room = self
            .members
            .registry()
            .create_room(&seed.name, seed.max_members, &seed.created_by)?;
        Ok(Some(room))
    }
}

/// Build the HTTP router: lobby API, health check, and the WebSocket endpoint.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.lobby.cors_origins);

    Router::new()
        .route("/api/chat/rooms", get(api::list_rooms).post(api::create_room))
        .route(
            "/api/chat/rooms/:id",
            get(api::get_room).delete(api::delete_room),
        )
        .route("/api/chat/rooms/:id/join", post(api::join_room))
        .route("/api/chat/rooms/:id/leave", post(api::leave_room))
        .route("/health", get(api::health))
        .route(&state.config.transport.websocket_path, get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!(origin = %origin, "Ignoring invalid CORS origin"))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

/// Run the server until interrupted.
///
/// # Errors
///
/// Returns an error if the default room is misconfigured or the listener
/// cannot be bound.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    if let Some(room) = state
        .seed_lobby()
        .context("Invalid default room in [lobby] config")?
    {
        info!(room = %room.id, name = %room.name, "Seeded default room");
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    serve(listener, state).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
