use super::session::{Effects, SessionEngine};
use super::AppState;
use crate::error::{EngineError, EngineResult};
use crate::mode::ModeStrategy;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};

/// Pen colors handed out in join order
const PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#bcf60c",
    "#008080", "#9a6324", "#800000", "#000075",
];

const MAX_DISPLAY_NAME_CHARS: usize = 24;

/// First palette color nobody on the roster is using
fn next_color(participants: &[Participant]) -> String {
    PALETTE
        .iter()
        .find(|c| !participants.iter().any(|p| p.color == **c))
        .unwrap_or(&PALETTE[participants.len() % PALETTE.len()])
        .to_string()
}

fn validate_display_name(display_name: &str) -> EngineResult<String> {
    let name = display_name.trim();
    if name.is_empty() {
        return Err(EngineError::ValidationFailed(
            "Display name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(EngineError::ValidationFailed(format!(
            "Display name is limited to {} characters",
            MAX_DISPLAY_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

impl SessionEngine {
    /// Add a participant to a session that has not started yet
    pub fn join(
        &mut self,
        display_name: String,
        _now: DateTime<Utc>,
    ) -> EngineResult<(Participant, Effects)> {
        if self.session.status != SessionStatus::Waiting {
            return Err(EngineError::NotWaiting);
        }
        let display_name = validate_display_name(&display_name)?;

        let participant = Participant {
            id: ulid::Ulid::new().to_string(),
            display_name,
            ready: false,
            connected: true,
            color: next_color(&self.session.participants),
            disconnect_seq: 0,
        };
        self.session.participants.push(participant.clone());
        tracing::info!(
            "{} joined session {} as {}",
            participant.display_name,
            self.session.id,
            participant.id
        );

        let mut fx = Effects::default();
        fx.outbox.broadcast(self.roster_message());
        Ok((participant, fx))
    }

    pub fn leave(&mut self, participant_id: &str, now: DateTime<Utc>) -> EngineResult<Effects> {
        if !self.session.is_present(participant_id) {
            return Err(EngineError::ParticipantNotFound);
        }
        let mut fx = Effects::default();
        self.remove_participant(participant_id, now, &mut fx);
        Ok(fx)
    }

    /// Drop a participant from the roster. Their seat and chain stay; the
    /// phase re-checks its threshold against the smaller required set.
    pub(crate) fn remove_participant(
        &mut self,
        participant_id: &str,
        now: DateTime<Utc>,
        fx: &mut Effects,
    ) {
        self.session.participants.retain(|p| p.id != participant_id);
        self.tracker.withdraw(participant_id);
        self.mode.on_participant_removed(participant_id);
        tracing::info!(
            "{} removed from session {}",
            participant_id,
            self.session.id
        );

        if self.session.participants.is_empty() {
            fx.abandoned = true;
            fx.cancel_timers = true;
            return;
        }

        fx.outbox.broadcast(ServerMessage::ParticipantRemoved {
            participant_id: participant_id.to_string(),
        });
        fx.outbox.broadcast(self.roster_message());
        self.check_threshold(now, fx);
    }
}

impl AppState {
    pub async fn join(&self, session_id: &str, display_name: String) -> EngineResult<Participant> {
        self.with_engine(session_id, |engine, now| engine.join(display_name, now))
            .await
    }

    pub async fn leave(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        self.with_runtime(session_id, |rt, now| {
            let fx = rt.engine.leave(participant_id, now)?;
            rt.grace.cancel(participant_id);
            rt.sockets.remove(participant_id);
            Ok(((), fx))
        })
        .await
    }
}
