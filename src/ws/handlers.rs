//! WebSocket message dispatch
//!
//! Each socket carries a [`Connection`] that remembers which seat it holds.
//! Seat checks happen here, then messages go to the lobby or play handlers.

use crate::broadcast::Envelope;
use crate::error::EngineResult;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ParticipantId, SessionId, Submission};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{lobby, play};

/// Per-socket session binding
#[derive(Debug, Default)]
pub struct Connection {
    pub session_id: Option<SessionId>,
    pub participant_id: Option<ParticipantId>,
    pub rx: Option<broadcast::Receiver<Envelope>>,
}

impl Connection {
    pub fn seat(&self) -> Option<(&str, &str)> {
        match (&self.session_id, &self.participant_id) {
            (Some(s), Some(p)) => Some((s.as_str(), p.as_str())),
            _ => None,
        }
    }

    pub(crate) fn attach(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
        rx: broadcast::Receiver<Envelope>,
    ) {
        self.session_id = Some(session_id);
        self.participant_id = Some(participant_id);
        self.rx = Some(rx);
    }

    pub(crate) fn detach(&mut self) {
        self.session_id = None;
        self.participant_id = None;
        self.rx = None;
    }
}

/// Return early unless the socket holds a seat
macro_rules! require_seat {
    ($conn:expr) => {
        match $conn.seat() {
            Some((s, p)) => (s.to_string(), p.to_string()),
            None => {
                return Some(ServerMessage::Error {
                    code: "NOT_IN_SESSION".to_string(),
                    msg: "Join a session first".to_string(),
                });
            }
        }
    };
}

/// One seat per socket
macro_rules! reject_if_seated {
    ($conn:expr) => {
        if $conn.seat().is_some() {
            return Some(ServerMessage::Error {
                code: "ALREADY_IN_SESSION".to_string(),
                msg: "This connection already holds a seat".to_string(),
            });
        }
    };
}

/// Engine results without a payload: success is silent, the broadcast tells the story
pub(super) fn respond(result: EngineResult<()>) -> Option<ServerMessage> {
    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::debug!("Rejected client message: {}", e);
            Some(ServerMessage::error(&e))
        }
    }
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateSession { display_name } => {
            reject_if_seated!(conn);
            lobby::handle_create_session(state, conn, display_name).await
        }

        ClientMessage::Join {
            session_id,
            display_name,
        } => {
            reject_if_seated!(conn);
            lobby::handle_join(state, conn, session_id, display_name).await
        }

        ClientMessage::Rejoin {
            session_id,
            participant_id,
        } => {
            reject_if_seated!(conn);
            lobby::handle_rejoin(state, conn, session_id, participant_id).await
        }

        ClientMessage::Leave => {
            let (session_id, participant_id) = require_seat!(conn);
            lobby::handle_leave(state, conn, &session_id, &participant_id).await
        }

        ClientMessage::MarkReady => {
            let (session_id, participant_id) = require_seat!(conn);
            respond(state.mark_ready(&session_id, &participant_id).await)
        }

        ClientMessage::UnmarkReady => {
            let (session_id, participant_id) = require_seat!(conn);
            respond(state.unmark_ready(&session_id, &participant_id).await)
        }

        ClientMessage::SelectMode { mode } => {
            let (session_id, participant_id) = require_seat!(conn);
            respond(state.select_mode(&session_id, &participant_id, mode).await)
        }

        ClientMessage::UpdateModeSettings { settings } => {
            let (session_id, participant_id) = require_seat!(conn);
            respond(
                state
                    .update_mode_settings(&session_id, &participant_id, settings)
                    .await,
            )
        }

        ClientMessage::StartSession => {
            let (session_id, participant_id) = require_seat!(conn);
            lobby::handle_start(state, &session_id, &participant_id).await
        }

        ClientMessage::Submit {
            kind,
            payload,
            strokes,
        } => {
            let (session_id, participant_id) = require_seat!(conn);
            let submission = Submission {
                kind,
                payload,
                strokes,
            };
            play::handle_submit(state, &session_id, &participant_id, submission).await
        }

        ClientMessage::RevealHint => {
            let (session_id, participant_id) = require_seat!(conn);
            play::handle_reveal_hint(state, &session_id, &participant_id).await
        }

        ClientMessage::SetCanvasHidden { hidden } => {
            let (session_id, participant_id) = require_seat!(conn);
            play::handle_set_canvas_hidden(state, &session_id, &participant_id, hidden).await
        }
    }
}
