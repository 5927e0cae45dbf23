//! REST lobby API.
//!
//! Clients poll the room list, create rooms, and join or leave them over
//! plain HTTP. Membership changes made here are broadcast on the room topic
//! exactly like those made over the realtime channel.

use crate::metrics;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use huddle_core::{LobbyError, Room};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A failed API request, rendered as `{error, message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Lobby(err) => match err {
                LobbyError::InvalidCapacity { .. }
                | LobbyError::InvalidName(_)
                | LobbyError::InvalidUsername(_) => StatusCode::BAD_REQUEST,
                LobbyError::RoomNotFound(_) => StatusCode::NOT_FOUND,
                LobbyError::RoomFull { .. } | LobbyError::NotMember { .. } => StatusCode::CONFLICT,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Lobby(err) => err.code(),
            ApiError::BadRequest(_) => "invalid_request",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub max_members: i64,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    #[serde(default)]
    pub username: String,
}

/// `GET /api/chat/rooms`
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<Room>> {
    Json(state.members.registry().list_rooms())
}

/// `POST /api/chat/rooms`
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let Json(request) = payload?;
    let room = state.members.registry().create_room(
        &request.name,
        request.max_members,
        request.created_by.as_deref().unwrap_or_default(),
    )?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// `GET /api/chat/rooms/:id`
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.members.registry().get_room(&id)?))
}

/// `DELETE /api/chat/rooms/:id`
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.members.close_room(&id)?))
}

/// `POST /api/chat/rooms/:id/join`
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<MembershipRequest>, JsonRejection>,
) -> ApiResult<Json<Room>> {
    let Json(request) = payload?;
    match state.members.join(&id, &request.username) {
        Ok(receipt) => {
            metrics::record_join(if receipt.is_new { "joined" } else { "already_member" });
            Ok(Json(receipt.room))
        }
        Err(err) => {
            debug!(room = %id, user = %request.username, error = %err, "REST join rejected");
            metrics::record_join(err.code());
            Err(err.into())
        }
    }
}

/// `POST /api/chat/rooms/:id/leave`
pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<MembershipRequest>, JsonRejection>,
) -> ApiResult<Json<Room>> {
    let Json(request) = payload?;
    Ok(Json(state.members.leave(&id, &request.username)?))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.members.registry().room_count(),
        "connections": state.gateway.connection_count(),
    }))
}
