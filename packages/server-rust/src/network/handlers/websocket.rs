//! Scope subscription over WebSocket.
//!
//! One session per socket: progress notifications for the scope arrive on
//! the hub channel and are written as JSON text frames; inbound `ping`
//! messages are answered with `pong`.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use opwatch_core::{format_timestamp, ClientMessage, PongData, ServerMessage};
use tracing::{debug, info, warn};

use super::AppState;
use crate::network::OutboundMessage;

const SHUTDOWN_REASON: &str = "server shutting down";

/// Upgrades to a WebSocket subscribed to `scope`.
///
/// Refuses with 503 unless the server is ready.
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.shutdown.health_state().is_accepting() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let connection = &state.config.connection;
    ws.write_buffer_size(connection.ws_write_buffer_size)
        .max_write_buffer_size(connection.ws_max_write_buffer_size)
        .on_upgrade(move |socket| run_session(socket, scope, state))
}

async fn run_session(socket: WebSocket, scope: String, state: AppState) {
    let _in_flight = state.shutdown.in_flight_guard();
    let (handle, mut outbound) = state.hub.register(scope.as_str(), &state.config.connection);
    let mut shutdown = state.shutdown.shutdown_receiver();
    let (mut sink, mut stream) = socket.split();
    info!(subscriber = handle.id.0, scope = %scope, "subscriber connected");

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(OutboundMessage::Text(text)) => {
                    if sink.send(Message::Text(text.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundMessage::Close(reason)) => {
                    let _ = sink.send(close_message(reason)).await;
                    break;
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = reply_to(text.as_str(), &state) {
                        if sink.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Protocol-level ping/pong is answered by the socket itself.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(subscriber = handle.id.0, error = %err, "socket read failed");
                    break;
                }
            },
            _ = shutdown.changed() => {
                let _ = sink.send(close_message(Some(SHUTDOWN_REASON.to_string()))).await;
                break;
            }
        }
    }

    state.hub.remove(handle.id);
    info!(subscriber = handle.id.0, scope = %scope, "subscriber disconnected");
}

/// Builds the reply to one inbound text frame, if it warrants one.
fn reply_to(text: &str, state: &AppState) -> Option<String> {
    match ClientMessage::from_json(text) {
        Ok(ClientMessage::Ping) => {
            let pong = ServerMessage::Pong(PongData {
                timestamp: format_timestamp(state.lifecycle.clock().now()),
            });
            match pong.to_json() {
                Ok(json) => Some(json),
                Err(err) => {
                    warn!(error = %err, "failed to encode pong");
                    None
                }
            }
        }
        Err(err) => {
            debug!(error = %err, "ignoring unrecognized subscriber message");
            None
        }
    }
}

fn close_message(reason: Option<String>) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: reason.unwrap_or_default().into(),
    }))
}
