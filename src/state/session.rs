//! Synchronous per-session engine
//!
//! Every operation runs to completion against plain data and reports what the
//! async layer has to do afterwards through [`Effects`]: messages to fan out,
//! timers to arm or cancel, and whether the session should be torn down.

use super::chain::ChainStore;
use super::submission::SubmissionTracker;
use super::AppState;
use crate::broadcast::Outbox;
use crate::error::{EngineError, EngineResult};
use crate::mode::{Mode, ModeCtx, ModeStrategy};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};

/// Fewest participants a session can start with
pub const MIN_PARTICIPANTS: usize = 2;

/// A freshly started phase whose timers need arming
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSchedule {
    pub phase_seq: u64,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Effects {
    pub outbox: Outbox,
    pub schedule: Option<PhaseSchedule>,
    /// Timers of the closed phase must be aborted
    pub cancel_timers: bool,
    pub finished: bool,
    /// Last participant is gone
    pub abandoned: bool,
}

#[derive(Debug)]
pub struct SessionEngine {
    pub session: Session,
    pub(crate) mode: Mode,
    pub(crate) chains: ChainStore,
    pub(crate) tracker: SubmissionTracker,
}

impl SessionEngine {
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        let mode = Mode::new(GameMode::Relay);
        let mut session = Session::new(id, now);
        session.mode = mode.kind();
        Self {
            session,
            mode,
            chains: ChainStore::default(),
            tracker: SubmissionTracker::default(),
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn chains(&self) -> &ChainStore {
        &self.chains
    }

    pub fn tracker(&self) -> &SubmissionTracker {
        &self.tracker
    }

    pub fn roster_message(&self) -> ServerMessage {
        ServerMessage::Roster {
            status: self.session.status,
            participants: self.session.participants.clone(),
            settings: self.mode.settings(),
        }
    }

    /// Final payload, once the session has finished
    pub fn result(&self) -> Option<SessionResult> {
        (self.session.status == SessionStatus::Finished)
            .then(|| self.mode.build_result(&self.session, &self.chains))
    }

    fn ensure_waiting(&self) -> EngineResult<()> {
        if self.session.status != SessionStatus::Waiting {
            return Err(EngineError::NotWaiting);
        }
        Ok(())
    }

    /// Switch game mode with default settings
    pub fn select_mode(&mut self, kind: GameMode) -> EngineResult<Effects> {
        self.ensure_waiting()?;
        self.mode = Mode::new(kind);
        self.session.mode = kind;
        tracing::info!("Session {} switched to {:?}", self.session.id, kind);

        let mut fx = Effects::default();
        fx.outbox.broadcast(self.roster_message());
        Ok(fx)
    }

    /// Replace the mode together with its settings
    pub fn update_mode_settings(&mut self, settings: ModeSettings) -> EngineResult<Effects> {
        self.ensure_waiting()?;
        self.session.mode = settings.mode();
        self.mode = Mode::with_settings(settings);

        let mut fx = Effects::default();
        fx.outbox.broadcast(self.roster_message());
        Ok(fx)
    }

    /// Freeze the seating, initialize the mode and open the first phase
    pub fn start(&mut self, now: DateTime<Utc>) -> EngineResult<Effects> {
        self.ensure_waiting()?;
        if self.session.participants.len() < MIN_PARTICIPANTS {
            return Err(EngineError::NotEnoughParticipants(MIN_PARTICIPANTS));
        }

        self.session.seats = self
            .session
            .participants
            .iter()
            .map(|p| p.id.clone())
            .collect();
        self.chains = ChainStore::for_seats(&self.session.seats);
        self.session.status = SessionStatus::Active;
        self.mode.initialize(&mut self.session)?;

        tracing::info!(
            "Session {} started: {:?} with {} participants, {} turns",
            self.session.id,
            self.session.mode,
            self.session.seats.len(),
            self.session.total_turns
        );

        let mut fx = Effects::default();
        fx.outbox.broadcast(self.roster_message());
        let (phase, turn) = (self.session.phase, self.session.turn);
        self.start_phase(phase, turn, now, &mut fx);
        Ok(fx)
    }

    /// Drawer-only quiz control
    pub fn reveal_hint(&mut self, participant_id: &str, now: DateTime<Utc>) -> EngineResult<Effects> {
        let mut fx = Effects::default();
        let Mode::Quiz(quiz) = &mut self.mode else {
            return Err(EngineError::InvalidPhase(self.session.phase));
        };
        quiz.reveal_hint(
            ModeCtx {
                session: &self.session,
                chains: &mut self.chains,
                out: &mut fx.outbox,
                now,
            },
            participant_id,
        )?;
        Ok(fx)
    }

    /// Drawer-only quiz control
    pub fn set_canvas_hidden(
        &mut self,
        participant_id: &str,
        hidden: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Effects> {
        let mut fx = Effects::default();
        let Mode::Quiz(quiz) = &mut self.mode else {
            return Err(EngineError::InvalidPhase(self.session.phase));
        };
        quiz.set_canvas_hidden(
            ModeCtx {
                session: &self.session,
                chains: &mut self.chains,
                out: &mut fx.outbox,
                now,
            },
            participant_id,
            hidden,
        )?;
        Ok(fx)
    }
}

impl AppState {
    pub async fn select_mode(
        &self,
        session_id: &str,
        participant_id: &str,
        kind: GameMode,
    ) -> EngineResult<()> {
        self.with_engine(session_id, |engine, _| {
            if !engine.session.is_present(participant_id) {
                return Err(EngineError::ParticipantNotFound);
            }
            Ok(((), engine.select_mode(kind)?))
        })
        .await
    }

    pub async fn update_mode_settings(
        &self,
        session_id: &str,
        participant_id: &str,
        settings: ModeSettings,
    ) -> EngineResult<()> {
        self.with_engine(session_id, |engine, _| {
            if !engine.session.is_present(participant_id) {
                return Err(EngineError::ParticipantNotFound);
            }
            Ok(((), engine.update_mode_settings(settings)?))
        })
        .await
    }

    pub async fn start_session(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            if !engine.session.is_present(participant_id) {
                return Err(EngineError::ParticipantNotFound);
            }
            Ok(((), engine.start(now)?))
        })
        .await
    }

    pub async fn reveal_hint(&self, session_id: &str, participant_id: &str) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            Ok(((), engine.reveal_hint(participant_id, now)?))
        })
        .await
    }

    pub async fn set_canvas_hidden(
        &self,
        session_id: &str,
        participant_id: &str,
        hidden: bool,
    ) -> EngineResult<()> {
        self.with_engine(session_id, |engine, now| {
            Ok(((), engine.set_canvas_hidden(participant_id, hidden, now)?))
        })
        .await
    }
}
