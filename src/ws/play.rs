//! In-game message handlers

use super::handlers::respond;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Submission;
use std::sync::Arc;

pub async fn handle_submit(
    state: &Arc<AppState>,
    session_id: &str,
    participant_id: &str,
    submission: Submission,
) -> Option<ServerMessage> {
    tracing::debug!(
        "{:?} submission from {} ({} bytes)",
        submission.kind,
        participant_id,
        submission.payload.len()
    );
    respond(state.submit(session_id, participant_id, submission).await)
}

pub async fn handle_reveal_hint(
    state: &Arc<AppState>,
    session_id: &str,
    participant_id: &str,
) -> Option<ServerMessage> {
    respond(state.reveal_hint(session_id, participant_id).await)
}

pub async fn handle_set_canvas_hidden(
    state: &Arc<AppState>,
    session_id: &str,
    participant_id: &str,
    hidden: bool,
) -> Option<ServerMessage> {
    tracing::debug!("{} sets canvas hidden={}", participant_id, hidden);
    respond(state.set_canvas_hidden(session_id, participant_id, hidden).await)
}
