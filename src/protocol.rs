use crate::types::*;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateSession {
        display_name: String,
    },
    Join {
        session_id: SessionId,
        display_name: String,
    },
    /// Resume with a previously issued participant id
    Rejoin {
        session_id: SessionId,
        participant_id: ParticipantId,
    },
    Leave,
    MarkReady,
    UnmarkReady,
    SelectMode {
        mode: GameMode,
    },
    UpdateModeSettings {
        settings: ModeSettings,
    },
    StartSession,
    Submit {
        kind: EntryKind,
        payload: String,
        #[serde(default)]
        strokes: Option<Vec<Stroke>>,
    },
    /// Quiz drawer only
    RevealHint,
    /// Quiz drawer only
    SetCanvasHidden {
        hidden: bool,
    },
}

/// Content handed to a single participant for the current phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ContentPayload {
    Text(String),
    Drawing(String),
    FrameSequence(Vec<String>),
    FrameSequenceWithBackground {
        frames: Vec<String>,
        background: String,
    },
}

impl ContentPayload {
    pub fn from_entry(entry: &Entry) -> Self {
        match entry.kind {
            EntryKind::Text => ContentPayload::Text(entry.payload.clone()),
            EntryKind::Drawing => ContentPayload::Drawing(entry.payload.clone()),
            EntryKind::Frame => ContentPayload::FrameSequence(vec![entry.payload.clone()]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        session_id: SessionId,
        participant: Participant,
        server_now: String,
    },
    Roster {
        status: SessionStatus,
        participants: Vec<Participant>,
        settings: ModeSettings,
    },
    Phase {
        phase: Phase,
        time_remaining_seconds: u32,
        deadline: Option<String>,
        turn: u32,
        total_turns: u32,
        server_now: String,
    },
    /// Periodic resync for client countdowns
    TimeRemaining {
        phase: Phase,
        time_remaining_seconds: u32,
        deadline: Option<String>,
        server_now: String,
    },
    SubmissionProgress {
        participant_id: ParticipantId,
        submitted_count: usize,
        total_required: usize,
    },
    SubmissionConfirmed,
    Content {
        payload: ContentPayload,
    },
    Result {
        result: SessionResult,
    },
    /// Sent to a participant on rejoin with everything needed to pick up mid-phase
    Resume {
        state: ResumeState,
    },
    QuizRound {
        round: u32,
        total_rounds: u32,
        drawer: ParticipantId,
        /// Only present for the drawer
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        answer_length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
        canvas_hidden: bool,
    },
    QuizActivity {
        item: ActivityItem,
    },
    QuizHint {
        hint: String,
    },
    CanvasHidden {
        hidden: bool,
    },
    QuizReveal {
        round: u32,
        answer: String,
        winners: Vec<QuizWinner>,
        scores: Vec<ScoreLine>,
    },
    WordAccepted {
        slot: u32,
        word: String,
    },
    ParticipantRemoved {
        participant_id: ParticipantId,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(err: &crate::error::EngineError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

/// State a rejoining participant needs to continue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeState {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub status: SessionStatus,
    pub mode: GameMode,
    pub phase: Phase,
    pub turn: u32,
    pub total_turns: u32,
    pub deadline: Option<String>,
    pub time_remaining_seconds: u32,
    pub content: Option<ContentPayload>,
    pub has_submitted: bool,
}

/// Entry in the quiz activity feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityItem {
    Guess {
        participant_id: ParticipantId,
        text: String,
    },
    Correct {
        participant_id: ParticipantId,
        rank: usize,
    },
    HintRevealed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_payload_wire_shape() {
        let json = serde_json::to_value(ContentPayload::Text("a cat".into())).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["data"], "a cat");

        let json = serde_json::to_value(ContentPayload::FrameSequenceWithBackground {
            frames: vec!["f0".into()],
            background: "f0".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "frameSequenceWithBackground");
        assert_eq!(json["data"]["background"], "f0");
    }

    #[test]
    fn test_client_message_parses_submit() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"submit","kind":"drawing","payload":"data:image/png"}"#)
                .unwrap();
        match msg {
            ClientMessage::Submit {
                kind,
                payload,
                strokes,
            } => {
                assert_eq!(kind, EntryKind::Drawing);
                assert_eq!(payload, "data:image/png");
                assert!(strokes.is_none());
            }
            _ => panic!("Expected Submit"),
        }
    }

    #[test]
    fn test_phase_message_tag() {
        let msg = ServerMessage::Phase {
            phase: Phase::Drawing,
            time_remaining_seconds: 120,
            deadline: None,
            turn: 1,
            total_turns: 3,
            server_now: "now".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "phase");
        assert_eq!(json["phase"], "DRAWING");
        assert_eq!(json["total_turns"], 3);
    }
}
