//! Disconnect grace period and resume
//!
//! Nothing about a participant's view is cached; a rejoin recomputes it from
//! the stored deadline and the mode's routing, so it is whatever the
//! participant would have been sent had they never dropped.

use super::scheduler;
use super::session::{Effects, SessionEngine};
use super::AppState;
use crate::error::{EngineError, EngineResult};
use crate::mode::ModeStrategy;
use crate::protocol::{ResumeState, ServerMessage};
use crate::types::*;
use chrono::{DateTime, Utc};

impl SessionEngine {
    /// Mark a participant offline; returns the sequence the grace timer must carry
    pub fn disconnect(&mut self, participant_id: &str) -> EngineResult<(u64, Effects)> {
        let participant = self
            .session
            .participant_mut(participant_id)
            .ok_or(EngineError::ParticipantNotFound)?;
        participant.connected = false;
        participant.disconnect_seq += 1;
        let seq = participant.disconnect_seq;

        tracing::info!(
            "{} disconnected from session {}",
            participant_id,
            self.session.id
        );
        let mut fx = Effects::default();
        fx.outbox.broadcast(self.roster_message());
        Ok((seq, fx))
    }

    /// Grace period ran out. Only removes the participant if they are still
    /// offline from the same disconnect.
    pub fn expire(&mut self, participant_id: &str, seq: u64, now: DateTime<Utc>) -> Effects {
        let mut fx = Effects::default();
        let still_gone = self
            .session
            .participant(participant_id)
            .is_some_and(|p| !p.connected && p.disconnect_seq == seq);
        if still_gone {
            tracing::info!(
                "{} did not return to session {} in time",
                participant_id,
                self.session.id
            );
            self.remove_participant(participant_id, now, &mut fx);
        }
        fx
    }

    pub fn rejoin(
        &mut self,
        participant_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<(ResumeState, Vec<ServerMessage>, Effects)> {
        let participant = self
            .session
            .participant_mut(participant_id)
            .ok_or(EngineError::ParticipantNotFound)?;
        participant.connected = true;
        participant.disconnect_seq += 1;

        let content = if self.session.status == SessionStatus::Active {
            self.mode
                .distribute_content(&self.session, &self.chains)?
                .remove(participant_id)
        } else {
            None
        };

        let state = ResumeState {
            session_id: self.session.id.clone(),
            participant_id: participant_id.to_string(),
            status: self.session.status,
            mode: self.session.mode,
            phase: self.session.phase,
            turn: self.session.turn,
            total_turns: self.session.total_turns,
            deadline: self.session.deadline.map(|d| d.to_rfc3339()),
            time_remaining_seconds: self.session.time_remaining(now),
            content,
            has_submitted: self.tracker.is_open() && self.tracker.contains(participant_id),
        };

        let mut extra = match self.session.status {
            SessionStatus::Active => self.mode.resume_messages(&self.session, participant_id),
            _ => Vec::new(),
        };
        if let Some(result) = self.result() {
            extra.push(ServerMessage::Result { result });
        }

        tracing::info!("{} rejoined session {}", participant_id, self.session.id);
        let mut fx = Effects::default();
        fx.outbox.broadcast(self.roster_message());
        Ok((state, extra, fx))
    }
}

impl AppState {
    /// Socket dropped: keep the seat for the grace period
    pub async fn disconnect(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        let grace = self.config.grace_period;
        let state = self.clone();
        self.with_runtime(session_id, |rt, _| {
            let remaining = rt
                .sockets
                .get_mut(participant_id)
                .map(|count| {
                    *count = count.saturating_sub(1);
                    *count
                })
                .unwrap_or(0);
            if remaining > 0 {
                tracing::debug!("{} still has {} open sockets", participant_id, remaining);
                return Ok(((), Effects::default()));
            }
            rt.sockets.remove(participant_id);

            let (seq, fx) = rt.engine.disconnect(participant_id)?;
            let handle = scheduler::spawn_grace(
                state,
                session_id.to_string(),
                participant_id.to_string(),
                seq,
                grace,
            );
            rt.grace.arm(participant_id, seq, handle);
            Ok(((), fx))
        })
        .await
    }

    /// Resume with a previously issued participant id
    pub async fn rejoin(&self, session_id: &str, participant_id: &str) -> EngineResult<ResumeState> {
        self.with_runtime(session_id, |rt, now| {
            // Cancel the pending removal before touching the roster
            rt.grace.cancel(participant_id);
            let (state, extra, mut fx) = rt.engine.rejoin(participant_id, now)?;
            for message in extra {
                fx.outbox.send_to(participant_id, message);
            }
            Ok((state, fx))
        })
        .await
    }

    pub(crate) async fn expire(&self, session_id: &str, participant_id: &str, seq: u64) {
        let Ok(runtime) = self.runtime(session_id).await else {
            return;
        };
        let mut rt = runtime.lock().await;
        rt.grace.release(participant_id, seq);
        let fx = rt.engine.expire(participant_id, seq, Utc::now());
        self.apply(session_id, &mut rt, fx).await;
    }
}
