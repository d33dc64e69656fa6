//! Game mode strategies
//!
//! Each mode owns its settings and any mode-specific state (quiz rounds,
//! shiritori pending words). The engine only talks to [`Mode`], a tagged union
//! over the four variants, through the [`ModeStrategy`] trait.

pub mod frame_relay;
pub mod kana;
pub mod quiz;
pub mod relay;
pub mod scoring;
pub mod shiritori;

use crate::broadcast::Outbox;
use crate::error::EngineResult;
use crate::protocol::{ContentPayload, ServerMessage};
use crate::state::chain::ChainStore;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub use frame_relay::FrameRelayMode;
pub use quiz::QuizMode;
pub use relay::RelayMode;
pub use shiritori::ShiritoriMode;

/// Fallback for phases a mode does not know about
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 60;

/// Mutable view handed to mode hooks that write chains or emit messages
pub struct ModeCtx<'a> {
    pub session: &'a Session,
    pub chains: &'a mut ChainStore,
    pub out: &'a mut Outbox,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Submitter joins the phase's submission set
    Counted,
    /// Accepted without gating the phase (canvas updates, wrong guesses, late words)
    Uncounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPhase {
    Continue { phase: Phase, turn: u32 },
    Finished,
}

/// Seat `seat` shifted by `offset` around a table of `n`
pub fn rotate(seat: usize, offset: u32, n: usize) -> usize {
    (seat + offset as usize) % n
}

pub trait ModeStrategy {
    /// Set the first phase, turn counter and total turn count
    fn initialize(&mut self, session: &mut Session) -> EngineResult<()>;

    /// Every phase the mode can open
    fn phases(&self) -> &'static [Phase];

    fn time_limit(&self, phase: Phase) -> u32;

    fn distribute_content(
        &self,
        session: &Session,
        chains: &ChainStore,
    ) -> EngineResult<HashMap<ParticipantId, ContentPayload>>;

    fn handle_submission(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome>;

    fn next_phase(&self, current: Phase, turn: u32, total_turns: u32) -> NextPhase;

    fn build_result(&self, session: &Session, chains: &ChainStore) -> SessionResult;

    fn eligible_submitters(&self, session: &Session) -> Vec<ParticipantId> {
        session.present_seats()
    }

    fn required_submission_count(&self, session: &Session, _phase: Phase) -> usize {
        self.eligible_submitters(session).len()
    }

    /// Fill in placeholders for `missing` eligible submitters when the deadline passes
    fn backfill(&mut self, _ctx: ModeCtx<'_>, _missing: &[ParticipantId]) -> EngineResult<()> {
        Ok(())
    }

    fn on_phase_start(&mut self, _ctx: ModeCtx<'_>) {}

    fn on_phase_end(&mut self, _ctx: ModeCtx<'_>) {}

    fn on_participant_removed(&mut self, _participant_id: &str) {}

    /// Phases that advance on `mark_ready` instead of content
    fn accepts_acknowledgement(&self, _phase: Phase) -> bool {
        false
    }

    /// Extra mode state a rejoining participant needs
    fn resume_messages(&self, _session: &Session, _participant_id: &str) -> Vec<ServerMessage> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub enum Mode {
    Relay(RelayMode),
    FrameRelay(FrameRelayMode),
    Shiritori(ShiritoriMode),
    Quiz(QuizMode),
}

macro_rules! dispatch {
    ($self:ident, $m:ident => $body:expr) => {
        match $self {
            Mode::Relay($m) => $body,
            Mode::FrameRelay($m) => $body,
            Mode::Shiritori($m) => $body,
            Mode::Quiz($m) => $body,
        }
    };
}

impl Mode {
    pub fn new(kind: GameMode) -> Self {
        match kind {
            GameMode::Relay => Mode::Relay(RelayMode::default()),
            GameMode::FrameRelay => Mode::FrameRelay(FrameRelayMode::default()),
            GameMode::Shiritori => Mode::Shiritori(ShiritoriMode::default()),
            GameMode::Quiz => Mode::Quiz(QuizMode::default()),
        }
    }

    pub fn with_settings(settings: ModeSettings) -> Self {
        match settings {
            ModeSettings::Relay(s) => Mode::Relay(RelayMode::new(s)),
            ModeSettings::FrameRelay(s) => Mode::FrameRelay(FrameRelayMode::new(s)),
            ModeSettings::Shiritori(s) => Mode::Shiritori(ShiritoriMode::new(s)),
            ModeSettings::Quiz(s) => Mode::Quiz(QuizMode::new(s)),
        }
    }

    pub fn kind(&self) -> GameMode {
        match self {
            Mode::Relay(_) => GameMode::Relay,
            Mode::FrameRelay(_) => GameMode::FrameRelay,
            Mode::Shiritori(_) => GameMode::Shiritori,
            Mode::Quiz(_) => GameMode::Quiz,
        }
    }

    pub fn settings(&self) -> ModeSettings {
        match self {
            Mode::Relay(m) => ModeSettings::Relay(m.settings.clone()),
            Mode::FrameRelay(m) => ModeSettings::FrameRelay(m.settings.clone()),
            Mode::Shiritori(m) => ModeSettings::Shiritori(m.settings.clone()),
            Mode::Quiz(m) => ModeSettings::Quiz(m.settings.clone()),
        }
    }
}

impl ModeStrategy for Mode {
    fn initialize(&mut self, session: &mut Session) -> EngineResult<()> {
        dispatch!(self, m => m.initialize(session))
    }

    fn phases(&self) -> &'static [Phase] {
        dispatch!(self, m => m.phases())
    }

    fn time_limit(&self, phase: Phase) -> u32 {
        dispatch!(self, m => m.time_limit(phase))
    }

    fn distribute_content(
        &self,
        session: &Session,
        chains: &ChainStore,
    ) -> EngineResult<HashMap<ParticipantId, ContentPayload>> {
        dispatch!(self, m => m.distribute_content(session, chains))
    }

    fn handle_submission(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        dispatch!(self, m => m.handle_submission(ctx, participant_id, submission))
    }

    fn next_phase(&self, current: Phase, turn: u32, total_turns: u32) -> NextPhase {
        dispatch!(self, m => m.next_phase(current, turn, total_turns))
    }

    fn build_result(&self, session: &Session, chains: &ChainStore) -> SessionResult {
        dispatch!(self, m => m.build_result(session, chains))
    }

    fn eligible_submitters(&self, session: &Session) -> Vec<ParticipantId> {
        dispatch!(self, m => m.eligible_submitters(session))
    }

    fn required_submission_count(&self, session: &Session, phase: Phase) -> usize {
        dispatch!(self, m => m.required_submission_count(session, phase))
    }

    fn backfill(&mut self, ctx: ModeCtx<'_>, missing: &[ParticipantId]) -> EngineResult<()> {
        dispatch!(self, m => m.backfill(ctx, missing))
    }

    fn on_phase_start(&mut self, ctx: ModeCtx<'_>) {
        dispatch!(self, m => m.on_phase_start(ctx))
    }

    fn on_phase_end(&mut self, ctx: ModeCtx<'_>) {
        dispatch!(self, m => m.on_phase_end(ctx))
    }

    fn on_participant_removed(&mut self, participant_id: &str) {
        dispatch!(self, m => m.on_participant_removed(participant_id))
    }

    fn accepts_acknowledgement(&self, phase: Phase) -> bool {
        dispatch!(self, m => m.accepts_acknowledgement(phase))
    }

    fn resume_messages(&self, session: &Session, participant_id: &str) -> Vec<ServerMessage> {
        dispatch!(self, m => m.resume_messages(session, participant_id))
    }
}
