//! Phase lifecycle: open, close, timeout and the countdown tick

use super::session::{Effects, PhaseSchedule, SessionEngine};
use super::AppState;
use crate::broadcast::{Audience, Envelope};
use crate::error::{EngineError, EngineResult};
use crate::mode::{ModeCtx, ModeStrategy, NextPhase};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};

impl SessionEngine {
    pub fn phase_message(&self, now: DateTime<Utc>) -> ServerMessage {
        ServerMessage::Phase {
            phase: self.session.phase,
            time_remaining_seconds: self.session.time_remaining(now),
            deadline: self.session.deadline.map(|d| d.to_rfc3339()),
            turn: self.session.turn,
            total_turns: self.session.total_turns,
            server_now: now.to_rfc3339(),
        }
    }

    /// Open `phase`: new epoch, fresh deadline, content pushed to everyone
    pub(crate) fn start_phase(
        &mut self,
        phase: Phase,
        turn: u32,
        now: DateTime<Utc>,
        fx: &mut Effects,
    ) {
        self.session.phase = phase;
        self.session.turn = turn;
        self.session.phase_seq += 1;
        let limit = self.mode.time_limit(phase);
        let deadline = now + Duration::seconds(i64::from(limit));
        self.session.deadline = Some(deadline);
        self.tracker.open();

        tracing::info!(
            "Session {} phase {:?} turn {}/{} ({}s)",
            self.session.id,
            phase,
            turn,
            self.session.total_turns,
            limit
        );

        fx.outbox.broadcast(self.phase_message(now));
        self.mode.on_phase_start(ModeCtx {
            session: &self.session,
            chains: &mut self.chains,
            out: &mut fx.outbox,
            now,
        });

        match self.mode.distribute_content(&self.session, &self.chains) {
            Ok(content) => {
                // Seat order keeps delivery deterministic
                for participant_id in &self.session.seats {
                    if let Some(payload) = content.get(participant_id) {
                        fx.outbox.send_to(
                            participant_id,
                            ServerMessage::Content {
                                payload: payload.clone(),
                            },
                        );
                    }
                }
            }
            Err(e) => tracing::error!("Content routing failed in {:?}: {}", phase, e),
        }

        fx.schedule = Some(PhaseSchedule {
            phase_seq: self.session.phase_seq,
            deadline,
        });
    }

    /// Close the open phase and move on. Returns false if it was already closing.
    pub(crate) fn close_phase(&mut self, now: DateTime<Utc>, fx: &mut Effects) -> bool {
        if !self.tracker.close() {
            return false;
        }
        fx.cancel_timers = true;
        self.mode.on_phase_end(ModeCtx {
            session: &self.session,
            chains: &mut self.chains,
            out: &mut fx.outbox,
            now,
        });

        match self.mode.next_phase(
            self.session.phase,
            self.session.turn,
            self.session.total_turns,
        ) {
            NextPhase::Continue { phase, turn } => self.start_phase(phase, turn, now, fx),
            NextPhase::Finished => self.finish(fx),
        }
        true
    }

    fn finish(&mut self, fx: &mut Effects) {
        self.session.status = SessionStatus::Finished;
        self.session.phase = Phase::Finished;
        self.session.deadline = None;
        fx.finished = true;

        tracing::info!("Session {} finished", self.session.id);
        let result = self.mode.build_result(&self.session, &self.chains);
        fx.outbox.broadcast(ServerMessage::Result { result });
        fx.outbox.broadcast(self.roster_message());
    }

    /// Deadline timer for epoch `phase_seq` fired
    pub fn on_deadline(&mut self, phase_seq: u64, now: DateTime<Utc>) -> Effects {
        let mut fx = Effects::default();
        if self.session.status != SessionStatus::Active
            || phase_seq != self.session.phase_seq
            || !self.tracker.is_open()
        {
            tracing::debug!(
                "Ignoring stale deadline for epoch {} (current {})",
                phase_seq,
                self.session.phase_seq
            );
            return fx;
        }

        let missing: Vec<ParticipantId> = self
            .mode
            .eligible_submitters(&self.session)
            .into_iter()
            .filter(|p| !self.tracker.contains(p))
            .collect();
        if !missing.is_empty() {
            tracing::info!(
                "Phase {:?} timed out, backfilling {} submissions",
                self.session.phase,
                missing.len()
            );
        }

        let backfilled = self.mode.backfill(
            ModeCtx {
                session: &self.session,
                chains: &mut self.chains,
                out: &mut fx.outbox,
                now,
            },
            &missing,
        );
        if let Err(e) = backfilled {
            tracing::warn!("Backfill failed in {:?}: {}", self.session.phase, e);
        }

        self.close_phase(now, &mut fx);
        fx
    }

    /// Countdown resync; `None` once the epoch is over
    pub fn tick(&self, phase_seq: u64, now: DateTime<Utc>) -> Option<ServerMessage> {
        if self.session.status != SessionStatus::Active
            || phase_seq != self.session.phase_seq
            || !self.tracker.is_open()
        {
            return None;
        }
        Some(ServerMessage::TimeRemaining {
            phase: self.session.phase,
            time_remaining_seconds: self.session.time_remaining(now),
            deadline: self.session.deadline.map(|d| d.to_rfc3339()),
            server_now: now.to_rfc3339(),
        })
    }

    /// Jump straight to `phase`, ending whatever is open without backfill
    pub fn force_phase(&mut self, phase: Phase, turn: u32, now: DateTime<Utc>) -> EngineResult<Effects> {
        if self.session.status != SessionStatus::Active {
            return Err(EngineError::InvalidPhase(self.session.phase));
        }
        if !self.mode.phases().contains(&phase) {
            return Err(EngineError::InvalidPhase(phase));
        }
        if turn >= self.session.total_turns {
            return Err(EngineError::ValidationFailed(format!(
                "Turn {} is past the last turn ({})",
                turn, self.session.total_turns
            )));
        }

        let mut fx = Effects {
            cancel_timers: true,
            ..Effects::default()
        };
        if self.tracker.close() {
            self.mode.on_phase_end(ModeCtx {
                session: &self.session,
                chains: &mut self.chains,
                out: &mut fx.outbox,
                now,
            });
        }
        self.start_phase(phase, turn, now, &mut fx);
        Ok(fx)
    }
}

impl AppState {
    /// Manually open a phase of an active session
    pub async fn start_phase(&self, session_id: &str, phase: Phase, turn: u32) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            Ok(((), engine.force_phase(phase, turn, now)?))
        })
        .await
    }

    pub(crate) async fn on_deadline(&self, session_id: &str, phase_seq: u64) {
        let Ok(runtime) = self.runtime(session_id).await else {
            return;
        };
        let mut rt = runtime.lock().await;
        // Detach our own handle so closing the phase does not abort this task
        rt.timers.release_deadline(phase_seq);
        let fx = rt.engine.on_deadline(phase_seq, Utc::now());
        self.apply(session_id, &mut rt, fx).await;
    }

    /// Returns false once the ticker should stop
    pub(crate) async fn tick(&self, session_id: &str, phase_seq: u64) -> bool {
        let Ok(runtime) = self.runtime(session_id).await else {
            return false;
        };
        let rt = runtime.lock().await;
        match rt.engine.tick(phase_seq, Utc::now()) {
            Some(message) => {
                // Ignore send errors (no receivers connected is fine)
                let _ = rt.tx.send(Envelope {
                    to: Audience::All,
                    message,
                });
                true
            }
            None => false,
        }
    }
}
