//! Engine error taxonomy
//!
//! Every variant is recoverable at the call site. The gateway turns them into
//! `ServerMessage::Error` for the participant that caused them.

use crate::types::Phase;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Submission not accepted during phase {0:?}")]
    InvalidPhase(Phase),

    #[error("Participant is not expected to submit in this phase")]
    NotEligible,

    #[error("No chain at index {0}")]
    UnknownChain(usize),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Participant not found")]
    ParticipantNotFound,

    #[error("Session is no longer waiting for players")]
    NotWaiting,

    #[error("At least {0} participants are required")]
    NotEnoughParticipants(usize),
}

impl EngineError {
    /// Stable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidPhase(_) => "INVALID_PHASE",
            EngineError::NotEligible => "NOT_ELIGIBLE",
            EngineError::UnknownChain(_) => "UNKNOWN_CHAIN",
            EngineError::ValidationFailed(_) => "VALIDATION_FAILED",
            EngineError::SessionNotFound => "SESSION_NOT_FOUND",
            EngineError::ParticipantNotFound => "PARTICIPANT_NOT_FOUND",
            EngineError::NotWaiting => "NOT_WAITING",
            EngineError::NotEnoughParticipants(_) => "NOT_ENOUGH_PARTICIPANTS",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
