pub mod handlers;
mod lobby;
mod play;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::broadcast::Envelope;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use handlers::Connection;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Next envelope from the session channel; never resolves before a seat is taken
async fn next_envelope(
    rx: &mut Option<broadcast::Receiver<Envelope>>,
) -> Result<Envelope, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn to_text(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            None
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = Connection::default();

    loop {
        tokio::select! {
            envelope = next_envelope(&mut conn.rx) => {
                match envelope {
                    Ok(envelope) => {
                        let Some(participant_id) = conn.participant_id.as_deref() else {
                            continue;
                        };
                        if !envelope.is_for(participant_id) {
                            continue;
                        }
                        if let Some(msg) = to_text(&envelope.message) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Session channel closed");
                        conn.detach();
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &mut conn, &state).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };

                        if let Some(msg) = response.as_ref().and_then(to_text) {
                            if sender.send(msg).await.is_err() {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Dropped sockets keep their seat for the grace period
    if let Some((session_id, participant_id)) = conn.seat() {
        if let Err(e) = state.disconnect(session_id, participant_id).await {
            tracing::debug!("Disconnect of {} ignored: {}", participant_id, e);
        }
    }
    tracing::info!("WebSocket connection closed");
}
