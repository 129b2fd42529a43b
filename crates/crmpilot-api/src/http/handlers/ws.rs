//! WebSocket handler binding one connection to a session.
//!
//! `/ws/{session_id}` upgrades the HTTP connection, registers a transport
//! channel as the session's live channel, and then multiplexes in a single
//! task:
//!
//! - **Outbound:** drains the channel's queue and writes each envelope to
//!   the socket as a JSON text frame.
//! - **Inbound:** parses text frames as [`InboundEnvelope`] and routes them
//!   to the orchestrator. Malformed frames are logged and ignored, never
//!   fatal to the connection.
//! - **Supersession:** a reconnect with the same session id rebinds the
//!   registry entry and cancels this channel's token, ending the loop.
//!
//! Disconnecting does **not** cancel in-flight request cycles; their results
//! land in history and the client reconciles by pulling the history page.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crmpilot_core::channel::ChannelHandle;
use crmpilot_types::protocol::InboundEnvelope;
use crmpilot_types::session::SessionId;

use crate::state::AppState;

/// Outbound queue depth per connection. A client this far behind is better
/// served by reconnect-and-pull than by unbounded buffering.
const CHANNEL_CAPACITY: usize = 32;

/// Upgrade an HTTP request to a WebSocket bound to `session_id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = SessionId::from(session_id);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, session_id))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (channel, mut outbound) = ChannelHandle::new(CHANNEL_CAPACITY);

    // Bind as the session's authoritative channel and greet the client.
    // Superseded channels (an older tab, a stale reconnect) get closed here.
    state.orchestrator.join(&session_id, channel.clone()).await;
    tracing::debug!(session = %session_id, channel = %channel.id(), "websocket bound");

    loop {
        tokio::select! {
            // --- Branch 1: deliver queued envelopes to the client ---
            envelope = outbound.recv() => {
                let Some(envelope) = envelope else { break };
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(session = %session_id, error = %err, "failed to serialize outbound frame");
                    }
                }
            }

            // --- Branch 2: a rebind superseded this channel ---
            _ = channel.closed().cancelled() => {
                tracing::debug!(session = %session_id, channel = %channel.id(), "channel superseded");
                break;
            }

            // --- Branch 3: inbound frames from the client ---
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        process_frame(&state, &session_id, &channel, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(session = %session_id, error = %err, "websocket receive error");
                        break;
                    }
                    // Binary, ping, pong frames are handled by the protocol layer.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Only unbinds if this channel is still the bound one; a replacement
    // that took over stays untouched.
    state
        .orchestrator
        .registry()
        .unbind(&session_id, channel.id());
    tracing::debug!(session = %session_id, channel = %channel.id(), "websocket closed");
}

/// Parse and route one inbound text frame.
async fn process_frame(state: &AppState, session_id: &SessionId, channel: &ChannelHandle, text: &str) {
    let envelope: InboundEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(session = %session_id, error = %err, "ignoring malformed frame");
            return;
        }
    };

    // The path segment is authoritative; a mismatched envelope id is a
    // client bug worth logging but not acting on.
    if envelope.session_id != *session_id {
        tracing::warn!(
            session = %session_id,
            claimed = %envelope.session_id,
            "frame session id does not match connection"
        );
    }

    state
        .orchestrator
        .handle_frame(session_id, envelope.frame, channel)
        .await;
}
