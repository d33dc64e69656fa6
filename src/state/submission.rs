use super::session::{Effects, SessionEngine};
use super::AppState;
use crate::error::{EngineError, EngineResult};
use crate::mode::{ModeCtx, ModeStrategy, SubmissionOutcome};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Newly added; carries the set size
    Added(usize),
    Duplicate,
    Closed,
}

/// Who has submitted during the current phase epoch
///
/// `close` succeeds once per epoch, so whichever of the threshold check or the
/// deadline gets there first is the only one that advances the phase.
#[derive(Debug, Clone)]
pub struct SubmissionTracker {
    state: TrackerState,
    submitted: Vec<ParticipantId>,
}

impl Default for SubmissionTracker {
    fn default() -> Self {
        Self {
            state: TrackerState::Closing,
            submitted: Vec::new(),
        }
    }
}

impl SubmissionTracker {
    pub fn open(&mut self) {
        self.state = TrackerState::Open;
        self.submitted.clear();
    }

    /// Returns false if the phase was already closing
    pub fn close(&mut self) -> bool {
        if self.state == TrackerState::Closing {
            return false;
        }
        self.state = TrackerState::Closing;
        true
    }

    pub fn is_open(&self) -> bool {
        self.state == TrackerState::Open
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.submitted.iter().any(|p| p == participant_id)
    }

    pub fn count(&self) -> usize {
        self.submitted.len()
    }

    pub fn record(&mut self, participant_id: &str) -> Recorded {
        if !self.is_open() {
            return Recorded::Closed;
        }
        if self.contains(participant_id) {
            return Recorded::Duplicate;
        }
        self.submitted.push(participant_id.to_string());
        Recorded::Added(self.submitted.len())
    }

    pub fn withdraw(&mut self, participant_id: &str) -> bool {
        let before = self.submitted.len();
        self.submitted.retain(|p| p != participant_id);
        before != self.submitted.len()
    }
}

impl SessionEngine {
    pub fn submit(
        &mut self,
        participant_id: &str,
        submission: Submission,
        now: DateTime<Utc>,
    ) -> EngineResult<Effects> {
        if self.session.status != SessionStatus::Active || !self.tracker.is_open() {
            return Err(EngineError::InvalidPhase(self.session.phase));
        }
        if !self.session.is_present(participant_id) {
            return Err(EngineError::ParticipantNotFound);
        }

        let mut fx = Effects::default();
        let outcome = self.mode.handle_submission(
            ModeCtx {
                session: &self.session,
                chains: &mut self.chains,
                out: &mut fx.outbox,
                now,
            },
            participant_id,
            submission,
        )?;

        if outcome == SubmissionOutcome::Counted {
            self.count_submission(participant_id, now, &mut fx);
        }
        Ok(fx)
    }

    /// Add to the submission set and advance if that crosses the threshold
    fn count_submission(&mut self, participant_id: &str, now: DateTime<Utc>, fx: &mut Effects) {
        match self.tracker.record(participant_id) {
            Recorded::Added(count) => {
                let required = self.required_count();
                tracing::debug!(
                    "{} submitted in {:?} ({}/{})",
                    participant_id,
                    self.session.phase,
                    count,
                    required
                );
                fx.outbox
                    .send_to(participant_id, ServerMessage::SubmissionConfirmed);
                fx.outbox.broadcast(ServerMessage::SubmissionProgress {
                    participant_id: participant_id.to_string(),
                    submitted_count: count,
                    total_required: required,
                });
                self.check_threshold(now, fx);
            }
            // Resubmission edits in place; the set is unchanged
            Recorded::Duplicate => {}
            Recorded::Closed => {}
        }
    }

    pub(crate) fn required_count(&self) -> usize {
        self.mode
            .required_submission_count(&self.session, self.session.phase)
    }

    /// Close the phase once enough submissions are in
    pub(crate) fn check_threshold(&mut self, now: DateTime<Utc>, fx: &mut Effects) {
        if self.session.status != SessionStatus::Active || !self.tracker.is_open() {
            return;
        }
        if self.tracker.count() >= self.required_count() {
            self.close_phase(now, fx);
        }
    }

    pub fn mark_ready(&mut self, participant_id: &str, now: DateTime<Utc>) -> EngineResult<Effects> {
        self.set_ready(participant_id, true, now)
    }

    pub fn unmark_ready(&mut self, participant_id: &str, now: DateTime<Utc>) -> EngineResult<Effects> {
        self.set_ready(participant_id, false, now)
    }

    fn set_ready(
        &mut self,
        participant_id: &str,
        ready: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Effects> {
        let mut fx = Effects::default();

        if self.session.status == SessionStatus::Waiting {
            let participant = self
                .session
                .participant_mut(participant_id)
                .ok_or(EngineError::ParticipantNotFound)?;
            participant.ready = ready;
            fx.outbox.broadcast(self.roster_message());
            return Ok(fx);
        }

        if !self.session.is_present(participant_id) {
            return Err(EngineError::ParticipantNotFound);
        }
        let acknowledging = self.session.status == SessionStatus::Active
            && self.tracker.is_open()
            && self.mode.accepts_acknowledgement(self.session.phase);
        if !acknowledging {
            return Err(EngineError::InvalidPhase(self.session.phase));
        }

        if ready {
            self.count_submission(participant_id, now, &mut fx);
        } else if self.tracker.withdraw(participant_id) {
            fx.outbox.broadcast(ServerMessage::SubmissionProgress {
                participant_id: participant_id.to_string(),
                submitted_count: self.tracker.count(),
                total_required: self.required_count(),
            });
        }
        Ok(fx)
    }
}

impl AppState {
    pub async fn submit(
        &self,
        session_id: &str,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            Ok(((), engine.submit(participant_id, submission, now)?))
        })
        .await
    }

    pub async fn mark_ready(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            Ok(((), engine.mark_ready(participant_id, now)?))
        })
        .await
    }

    pub async fn unmark_ready(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            Ok(((), engine.unmark_ready(participant_id, now)?))
        })
        .await
    }
}
