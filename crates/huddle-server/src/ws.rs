//! WebSocket transport.
//!
//! One task per connection. The task owns the client's [`Session`], feeds
//! decoded frames to the gateway, writes replies straight back, and drains
//! the session's outbound queue of topic events onto the socket. Text
//! messages carry JSON frames, binary messages carry length-prefixed
//! MessagePack frames.

use crate::gateway::Session;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::server::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use huddle_protocol::codec::{self, Encoded};
use huddle_protocol::{codes, Encoding, Frame};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, warn};

type WsSink = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler.
///
/// The connection slot is reserved before upgrading, so concurrent upgrades
/// cannot push the server past `max_connections`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if !state.gateway.try_reserve(state.config.limits.max_connections) {
        warn!(
            open = state.gateway.connection_count(),
            "Connection limit reached, refusing upgrade"
        );
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let failed = Arc::clone(&state);
    ws.max_message_size(state.config.limits.max_frame_size)
        .on_failed_upgrade(move |e| {
            warn!(error = %e, "WebSocket upgrade failed");
            failed.gateway.release_reservation();
        })
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let (mut session, mut outbound) = state.gateway.on_connect_reserved();
    let (mut sink, mut stream) = socket.split();

    let heartbeat = Duration::from_millis(state.config.heartbeat.interval_ms.max(1));
    let idle_timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    let mut last_seen = Instant::now();

    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some(frame) = outbound.recv() => {
                if send_frame(&mut sink, &frame, session.encoding()).await.is_err() {
                    break;
                }
            }

            msg = stream.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        session.set_encoding(Encoding::Text);
                        let reply = match codec::decode_text(&text) {
                            Ok(frame) => dispatch(&state, &mut session, frame),
                            Err(e) => Some(invalid_frame(&session, &e)),
                        };
                        if !reply_with(&mut sink, reply, session.encoding()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_message(data.len(), "inbound");
                        session.set_encoding(Encoding::Binary);
                        read_buffer.extend_from_slice(&data);
                        if !drain_binary(&state, &mut session, &mut sink, &mut read_buffer).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %session.id(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %session.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %session.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                if last_seen.elapsed() > idle_timeout {
                    debug!(connection = %session.id(), "Idle timeout");
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.gateway.on_disconnect(session);
}

fn dispatch(state: &AppState, session: &mut Session, frame: Frame) -> Option<Frame> {
    let start = std::time::Instant::now();
    let reply = state.gateway.handle_frame(session, frame);
    metrics::record_latency(start.elapsed().as_secs_f64());
    reply
}

/// Decode and handle every complete binary frame in the buffer.
///
/// Returns `false` once the socket can no longer be written.
async fn drain_binary(
    state: &AppState,
    session: &mut Session,
    sink: &mut WsSink,
    buffer: &mut BytesMut,
) -> bool {
    loop {
        let reply = match codec::decode_from(buffer) {
            Ok(Some(frame)) => dispatch(state, session, frame),
            Ok(None) => return true,
            Err(e) => {
                // The stream position is lost, start over with the next message
                buffer.clear();
                Some(invalid_frame(session, &e))
            }
        };
        if !reply_with(sink, reply, session.encoding()).await {
            return false;
        }
        if buffer.is_empty() {
            return true;
        }
    }
}

fn invalid_frame(session: &Session, err: &codec::ProtocolError) -> Frame {
    warn!(connection = %session.id(), error = %err, "Undecodable frame");
    metrics::record_error("decode");
    Frame::error(0, codes::INVALID_FRAME, err.to_string())
}

async fn reply_with(sink: &mut WsSink, reply: Option<Frame>, encoding: Encoding) -> bool {
    match reply {
        Some(frame) => send_frame(sink, &frame, encoding).await.is_ok(),
        None => true,
    }
}

async fn send_frame(sink: &mut WsSink, frame: &Frame, encoding: Encoding) -> Result<()> {
    let encoded = match codec::encode_as(frame, encoding) {
        Ok(encoded) => encoded,
        Err(e) => {
            // Not fatal for the connection: skip this frame
            error!(error = %e, frame_type = ?frame.frame_type(), "Failed to encode frame");
            metrics::record_error("encode");
            return Ok(());
        }
    };
    metrics::record_message(encoded.len(), "outbound");

    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sink.send(message).await?;
    Ok(())
}
