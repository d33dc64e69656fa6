//! Session membership handlers
//!
//! Join and rejoin subscribe to the session channel before touching the
//! roster, so the socket sees the roster broadcast its own arrival causes.

use super::handlers::{respond, Connection};
use crate::protocol::{ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use crate::types::{ParticipantId, SessionId};
use std::sync::Arc;

pub async fn handle_create_session(
    state: &Arc<AppState>,
    conn: &mut Connection,
    display_name: String,
) -> Option<ServerMessage> {
    let session_id = state.create_session().await;
    let response = handle_join(state, conn, session_id.clone(), display_name).await;
    if conn.seat().is_none() {
        state.cleanup(&session_id).await;
    }
    response
}

pub async fn handle_join(
    state: &Arc<AppState>,
    conn: &mut Connection,
    session_id: SessionId,
    display_name: String,
) -> Option<ServerMessage> {
    tracing::info!("Join request for session {}: {}", session_id, display_name);
    let rx = match state.subscribe(&session_id).await {
        Ok(rx) => rx,
        Err(e) => return Some(ServerMessage::error(&e)),
    };

    match state.join(&session_id, display_name).await {
        Ok(participant) => {
            if let Err(e) = state.attach_socket(&session_id, &participant.id).await {
                return Some(ServerMessage::error(&e));
            }
            conn.attach(session_id.clone(), participant.id.clone(), rx);
            Some(ServerMessage::Welcome {
                protocol: PROTOCOL_VERSION.to_string(),
                session_id,
                participant,
                server_now: chrono::Utc::now().to_rfc3339(),
            })
        }
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_rejoin(
    state: &Arc<AppState>,
    conn: &mut Connection,
    session_id: SessionId,
    participant_id: ParticipantId,
) -> Option<ServerMessage> {
    tracing::info!("Rejoin request for session {}: {}", session_id, participant_id);
    let rx = match state.subscribe(&session_id).await {
        Ok(rx) => rx,
        Err(e) => return Some(ServerMessage::error(&e)),
    };

    match state.rejoin(&session_id, &participant_id).await {
        Ok(resume) => {
            if let Err(e) = state.attach_socket(&session_id, &participant_id).await {
                return Some(ServerMessage::error(&e));
            }
            conn.attach(session_id, participant_id, rx);
            Some(ServerMessage::Resume { state: resume })
        }
        Err(e) => Some(ServerMessage::error(&e)),
    }
}

pub async fn handle_leave(
    state: &Arc<AppState>,
    conn: &mut Connection,
    session_id: &str,
    participant_id: &str,
) -> Option<ServerMessage> {
    let result = state.leave(session_id, participant_id).await;
    conn.detach();
    respond(result)
}

pub async fn handle_start(
    state: &Arc<AppState>,
    session_id: &str,
    participant_id: &str,
) -> Option<ServerMessage> {
    tracing::info!("{} starts session {}", participant_id, session_id);
    respond(state.start_session(session_id, participant_id).await)
}
