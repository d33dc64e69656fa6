use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type SessionId = String;
pub type ParticipantId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    /// Relay: everyone writes the opening prompt of their own chain
    Prompt,
    Drawing,
    Guessing,
    /// Frame-Relay: everyone seeds their own animation
    FirstFrame,
    /// Shiritori: drawers still owe the word for their drawing
    WordCompletion,
    /// Quiz: answer reveal between rounds
    RoundResult,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Relay,
    FrameRelay,
    Shiritori,
    Quiz,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub ready: bool,
    pub connected: bool,
    pub color: String,
    /// Bumped on every disconnect and rejoin; a grace timer only removes the
    /// participant if the sequence it captured is still current.
    #[serde(skip)]
    pub disconnect_seq: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Text,
    Drawing,
    Frame,
}

/// One pen stroke, kept for replay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stroke {
    pub color: String,
    pub width: f32,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub order: u32,
    pub kind: EntryKind,
    pub author: ParticipantId,
    /// Text, or an encoded image for drawings and frames
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strokes: Option<Vec<Stroke>>,
    pub submitted_at: DateTime<Utc>,
    /// Backfilled on timeout rather than submitted
    #[serde(default)]
    pub placeholder: bool,
    /// Phase epoch that produced this entry
    #[serde(skip)]
    pub phase_seq: u64,
}

/// Incoming contribution from a participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub kind: EntryKind,
    pub payload: String,
    #[serde(default)]
    pub strokes: Option<Vec<Stroke>>,
}

impl Submission {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Text,
            payload: payload.into(),
            strokes: None,
        }
    }

    pub fn drawing(payload: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Drawing,
            payload: payload.into(),
            strokes: None,
        }
    }

    pub fn frame(payload: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Frame,
            payload: payload.into(),
            strokes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    /// Roster in join order
    pub participants: Vec<Participant>,
    /// Roster snapshot taken at start. A seat index is both the rotation
    /// index and the index of the chain that seat owns.
    pub seats: Vec<ParticipantId>,
    pub mode: GameMode,
    pub phase: Phase,
    pub turn: u32,
    pub total_turns: u32,
    pub deadline: Option<DateTime<Utc>>,
    /// Incremented on every phase start; timers carry the value they were armed with
    pub phase_seq: u64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SessionStatus::Waiting,
            participants: Vec::new(),
            seats: Vec::new(),
            mode: GameMode::Relay,
            phase: Phase::Waiting,
            turn: 0,
            total_turns: 0,
            deadline: None,
            phase_seq: 0,
            created_at: now,
        }
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn is_present(&self, id: &str) -> bool {
        self.participant(id).is_some()
    }

    pub fn seat_of(&self, id: &str) -> Option<usize> {
        self.seats.iter().position(|s| s == id)
    }

    /// Seated participants that are still on the roster, in seat order
    pub fn present_seats(&self) -> Vec<ParticipantId> {
        self.seats
            .iter()
            .filter(|s| self.is_present(s))
            .cloned()
            .collect()
    }

    /// First present seat at or after `start`, wrapping around
    pub fn present_seat_from(&self, start: usize) -> Option<&ParticipantId> {
        let n = self.seats.len();
        (0..n)
            .map(|k| &self.seats[(start + k) % n])
            .find(|s| self.is_present(s))
    }

    /// Whole seconds until the current deadline, never negative
    pub fn time_remaining(&self, now: DateTime<Utc>) -> u32 {
        match self.deadline {
            Some(deadline) => {
                let millis = (deadline - now).num_milliseconds().max(0);
                // Round up so a client never shows 0 while the phase is still open
                ((millis + 999) / 1000) as u32
            }
            None => 0,
        }
    }
}

/// Final payload of a finished session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionResult {
    Chains {
        mode: GameMode,
        chains: Vec<Chain>,
        roster: Vec<Participant>,
    },
    Shiritori {
        links: Vec<ShiritoriLinkView>,
        connected_count: usize,
        complete: bool,
        roster: Vec<Participant>,
    },
    Quiz {
        scores: Vec<ScoreLine>,
        rounds: Vec<QuizRoundSummary>,
    },
}

/// One seat's accumulating sequence of contributions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chain {
    pub owner: ParticipantId,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShiritoriLinkView {
    pub slot: u32,
    pub drawer: ParticipantId,
    pub drawing: Option<String>,
    pub word: Option<String>,
    pub skipped: bool,
    /// `None` when either side of the link has no word
    pub connects_previous: Option<bool>,
    pub ends_with_n: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreLine {
    pub participant_id: ParticipantId,
    pub display_name: Option<String>,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizWinner {
    pub participant_id: ParticipantId,
    /// 0-based
    pub rank: usize,
    pub points: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizRoundSummary {
    pub round: u32,
    pub drawer: ParticipantId,
    pub answer: String,
    pub winners: Vec<QuizWinner>,
}

// ========== Mode Settings ==========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeSettings {
    Relay(RelaySettings),
    FrameRelay(FrameRelaySettings),
    Shiritori(ShiritoriSettings),
    Quiz(QuizSettings),
}

impl ModeSettings {
    pub fn mode(&self) -> GameMode {
        match self {
            ModeSettings::Relay(_) => GameMode::Relay,
            ModeSettings::FrameRelay(_) => GameMode::FrameRelay,
            ModeSettings::Shiritori(_) => GameMode::Shiritori,
            ModeSettings::Quiz(_) => GameMode::Quiz,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelaySettings {
    pub prompt_seconds: u32,
    pub drawing_seconds: u32,
    pub guessing_seconds: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            prompt_seconds: 60,
            drawing_seconds: 120,
            guessing_seconds: 45,
        }
    }
}

/// What a frame-relay drawer sees of the animation so far
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FramePreview {
    /// Previous frame as a tracing background
    Background,
    /// The whole sequence as a flipbook
    Sequence,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameRelaySettings {
    pub first_frame_seconds: u32,
    pub drawing_seconds: u32,
    pub preview: FramePreview,
}

impl Default for FrameRelaySettings {
    fn default() -> Self {
        Self {
            first_frame_seconds: 90,
            drawing_seconds: 90,
            preview: FramePreview::Background,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShiritoriSettings {
    pub drawing_seconds: u32,
    pub word_seconds: u32,
    /// Each participant draws this many times
    pub rounds: u32,
    pub max_word_length: usize,
}

impl Default for ShiritoriSettings {
    fn default() -> Self {
        Self {
            drawing_seconds: 60,
            word_seconds: 30,
            rounds: 1,
            max_word_length: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizPrompt {
    pub answer: String,
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuizSettings {
    pub drawing_seconds: u32,
    pub result_seconds: u32,
    /// Defaults to the roster size when unset
    pub rounds: Option<u32>,
    /// Points by rank, first correct guesser first
    pub winner_points: Vec<u32>,
    pub drawer_bonus: u32,
    pub consolation_points: u32,
    pub max_winners: usize,
    /// Most points any participant can earn in a single round
    pub per_round_cap: u32,
    pub prompts: Vec<QuizPrompt>,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            drawing_seconds: 90,
            result_seconds: 8,
            rounds: None,
            winner_points: vec![3, 2, 1],
            drawer_bonus: 2,
            consolation_points: 1,
            max_winners: 3,
            per_round_cap: 5,
            prompts: Vec::new(),
        }
    }
}
