//! Drawing quiz
//!
//! Each round one participant draws a secret answer while everyone else
//! guesses. The round closes once `max_winners` guessers are right or the
//! clock runs out, followed by a short `RoundResult` reveal that closes when
//! everybody has acknowledged it.

use super::kana::normalize_answer;
use super::scoring::Scoreboard;
use super::{ModeCtx, ModeStrategy, NextPhase, SubmissionOutcome, DEFAULT_TIME_LIMIT_SECS};
use crate::broadcast::Outbox;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{ActivityItem, ContentPayload, ServerMessage};
use crate::state::chain::{ChainStore, EntryKey};
use crate::types::*;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};

const FEED_CAPACITY: usize = 20;

/// Used when the session did not configure its own prompts
const BUILTIN_PROMPTS: &[&str] = &[
    "ねこ",
    "いぬ",
    "りんご",
    "でんしゃ",
    "ひこうき",
    "すいか",
    "かさ",
    "とけい",
    "さかな",
    "やま",
    "くるま",
    "ぺんぎん",
    "ゆきだるま",
    "たいよう",
    "めがね",
];

const HINT_MASK: char = '○';

#[derive(Debug, Clone, PartialEq)]
pub struct QuizRound {
    /// 1-based for display
    pub round: u32,
    pub drawer: ParticipantId,
    pub prompt: QuizPrompt,
    pub hint_revealed: bool,
    pub winners: Vec<QuizWinner>,
    pub canvas_hidden: bool,
}

impl QuizRound {
    fn hint(&self) -> String {
        self.prompt
            .hint
            .clone()
            .unwrap_or_else(|| masked_hint(&self.prompt.answer))
    }

    fn has_won(&self, participant_id: &str) -> bool {
        self.winners.iter().any(|w| w.participant_id == participant_id)
    }
}

/// First character of the answer, the rest masked
fn masked_hint(answer: &str) -> String {
    let mut chars = answer.chars();
    match chars.next() {
        Some(first) => std::iter::once(first)
            .chain(chars.map(|_| HINT_MASK))
            .collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuizMode {
    pub settings: QuizSettings,
    round: Option<QuizRound>,
    scoreboard: Scoreboard,
    feed: VecDeque<ActivityItem>,
    used_prompts: HashSet<usize>,
    history: Vec<QuizRoundSummary>,
}

impl QuizMode {
    pub fn new(settings: QuizSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn round(&self) -> Option<&QuizRound> {
        self.round.as_ref()
    }

    pub fn history(&self) -> &[QuizRoundSummary] {
        &self.history
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn feed(&self) -> impl Iterator<Item = &ActivityItem> {
        self.feed.iter()
    }

    pub fn current_drawer(session: &Session) -> Option<ParticipantId> {
        if session.seats.is_empty() {
            return None;
        }
        session
            .present_seat_from(session.turn as usize % session.seats.len())
            .cloned()
    }

    fn prompt_pool(&self) -> Vec<QuizPrompt> {
        if self.settings.prompts.is_empty() {
            BUILTIN_PROMPTS
                .iter()
                .map(|answer| QuizPrompt {
                    answer: answer.to_string(),
                    hint: None,
                })
                .collect()
        } else {
            self.settings.prompts.clone()
        }
    }

    /// Random prompt not used yet this session; starts over once exhausted
    fn pick_prompt(&mut self) -> QuizPrompt {
        let pool = self.prompt_pool();
        let mut unused: Vec<usize> = (0..pool.len())
            .filter(|i| !self.used_prompts.contains(i))
            .collect();
        if unused.is_empty() {
            self.used_prompts.clear();
            unused = (0..pool.len()).collect();
        }

        let mut rng = rand::rng();
        let index = unused[rng.random_range(0..unused.len())];
        self.used_prompts.insert(index);
        pool[index].clone()
    }

    fn push_activity(&mut self, out: &mut Outbox, item: ActivityItem) {
        if self.feed.len() == FEED_CAPACITY {
            self.feed.pop_front();
        }
        self.feed.push_back(item.clone());
        out.broadcast(ServerMessage::QuizActivity { item });
    }

    fn round_message(&self, session: &Session, participant_id: &str) -> Option<ServerMessage> {
        let round = self.round.as_ref()?;
        Some(ServerMessage::QuizRound {
            round: round.round,
            total_rounds: session.total_turns,
            drawer: round.drawer.clone(),
            answer: (round.drawer == participant_id).then(|| round.prompt.answer.clone()),
            answer_length: round.prompt.answer.chars().count(),
            hint: round.hint_revealed.then(|| round.hint()),
            canvas_hidden: round.canvas_hidden,
        })
    }

    fn reveal_message(&self, session: &Session) -> Option<ServerMessage> {
        let summary = self.history.last()?;
        Some(ServerMessage::QuizReveal {
            round: summary.round,
            answer: summary.answer.clone(),
            winners: summary.winners.clone(),
            scores: self.scoreboard.standings(&session.participants),
        })
    }

    fn current_canvas<'c>(
        session: &Session,
        chains: &'c ChainStore,
        drawer: &str,
    ) -> EngineResult<Option<&'c Entry>> {
        let Some(seat) = session.seat_of(drawer) else {
            return Ok(None);
        };
        chains.find(
            seat,
            EntryKey {
                author: drawer,
                kind: EntryKind::Drawing,
                phase_seq: session.phase_seq,
            },
        )
    }

    fn drawing_round(&mut self, session: &Session, participant_id: &str) -> EngineResult<&mut QuizRound> {
        if session.phase != Phase::Drawing {
            return Err(EngineError::InvalidPhase(session.phase));
        }
        let round = self
            .round
            .as_mut()
            .ok_or(EngineError::InvalidPhase(session.phase))?;
        if round.drawer != participant_id {
            return Err(EngineError::NotEligible);
        }
        Ok(round)
    }

    /// Drawer reveals the hint to everyone; repeating it is a no-op
    pub fn reveal_hint(&mut self, ctx: ModeCtx<'_>, participant_id: &str) -> EngineResult<()> {
        let round = self.drawing_round(ctx.session, participant_id)?;
        if round.hint_revealed {
            return Ok(());
        }
        round.hint_revealed = true;
        let hint = round.hint();

        tracing::debug!("Quiz hint revealed in round {}", round.round);
        ctx.out.broadcast(ServerMessage::QuizHint { hint });
        self.push_activity(ctx.out, ActivityItem::HintRevealed);
        Ok(())
    }

    /// Drawer hides or shows the live canvas to guessers
    pub fn set_canvas_hidden(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        hidden: bool,
    ) -> EngineResult<()> {
        let round = self.drawing_round(ctx.session, participant_id)?;
        if round.canvas_hidden == hidden {
            return Ok(());
        }
        round.canvas_hidden = hidden;
        ctx.out.broadcast(ServerMessage::CanvasHidden { hidden });

        if !hidden {
            if let Some(canvas) = Self::current_canvas(ctx.session, ctx.chains, participant_id)? {
                let payload = ContentPayload::Drawing(canvas.payload.clone());
                for guesser in ctx.session.present_seats() {
                    if guesser != participant_id {
                        ctx.out.send_to(
                            &guesser,
                            ServerMessage::Content {
                                payload: payload.clone(),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn submit_canvas(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        let session = ctx.session;
        let seat = session
            .seat_of(participant_id)
            .ok_or(EngineError::NotEligible)?;
        ctx.chains.upsert(
            seat,
            EntryKey {
                author: participant_id,
                kind: EntryKind::Drawing,
                phase_seq: session.phase_seq,
            },
            submission.payload.clone(),
            submission.strokes,
            false,
            ctx.now,
        )?;

        let hidden = self.round.as_ref().is_some_and(|r| r.canvas_hidden);
        if !hidden {
            let payload = ContentPayload::Drawing(submission.payload);
            for guesser in session.present_seats() {
                if guesser != participant_id {
                    ctx.out.send_to(
                        &guesser,
                        ServerMessage::Content {
                            payload: payload.clone(),
                        },
                    );
                }
            }
        }
        Ok(SubmissionOutcome::Uncounted)
    }

    fn submit_guess(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        let max_winners = self.settings.max_winners.max(1);
        let Some(round) = self.round.as_mut() else {
            return Err(EngineError::InvalidPhase(ctx.session.phase));
        };
        if round.has_won(participant_id) || round.winners.len() >= max_winners {
            return Ok(SubmissionOutcome::Uncounted);
        }

        let guess = normalize_answer(&submission.payload);
        if guess.is_empty() {
            return Err(EngineError::ValidationFailed("Empty guess".to_string()));
        }

        if guess != normalize_answer(&round.prompt.answer) {
            self.push_activity(
                ctx.out,
                ActivityItem::Guess {
                    participant_id: participant_id.to_string(),
                    text: submission.payload,
                },
            );
            return Ok(SubmissionOutcome::Uncounted);
        }

        let rank = round.winners.len();
        let drawer = round.drawer.clone();
        let award = self
            .scoreboard
            .award_correct(&self.settings, &drawer, participant_id, rank);
        round.winners.push(QuizWinner {
            participant_id: participant_id.to_string(),
            rank,
            points: award.guesser_points,
            at: ctx.now,
        });

        tracing::info!(
            "Quiz round {}: {} guessed correctly (rank {}, +{})",
            round.round,
            participant_id,
            rank,
            award.guesser_points
        );
        self.push_activity(
            ctx.out,
            ActivityItem::Correct {
                participant_id: participant_id.to_string(),
                rank,
            },
        );
        Ok(SubmissionOutcome::Counted)
    }
}

impl ModeStrategy for QuizMode {
    fn initialize(&mut self, session: &mut Session) -> EngineResult<()> {
        self.round = None;
        self.feed.clear();
        self.used_prompts.clear();
        self.history.clear();
        self.scoreboard = Scoreboard::with_participants(&session.seats);

        session.phase = Phase::Drawing;
        session.turn = 0;
        session.total_turns = self
            .settings
            .rounds
            .unwrap_or(session.seats.len() as u32)
            .max(1);
        Ok(())
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Drawing, Phase::RoundResult]
    }

    fn time_limit(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Drawing => self.settings.drawing_seconds,
            Phase::RoundResult => self.settings.result_seconds,
            _ => DEFAULT_TIME_LIMIT_SECS,
        }
    }

    fn distribute_content(
        &self,
        session: &Session,
        chains: &ChainStore,
    ) -> EngineResult<HashMap<ParticipantId, ContentPayload>> {
        let mut content = HashMap::new();
        let Some(round) = self.round.as_ref() else {
            return Ok(content);
        };
        if session.phase != Phase::Drawing {
            return Ok(content);
        }
        let Some(canvas) = Self::current_canvas(session, chains, &round.drawer)? else {
            return Ok(content);
        };

        for participant_id in session.present_seats() {
            if participant_id == round.drawer || !round.canvas_hidden {
                content.insert(participant_id, ContentPayload::Drawing(canvas.payload.clone()));
            }
        }
        Ok(content)
    }

    fn handle_submission(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        let phase = ctx.session.phase;
        if phase != Phase::Drawing {
            return Err(EngineError::InvalidPhase(phase));
        }
        let is_drawer = self
            .round
            .as_ref()
            .map(|r| r.drawer == participant_id)
            .ok_or(EngineError::InvalidPhase(phase))?;

        match (is_drawer, submission.kind) {
            (true, EntryKind::Drawing) => self.submit_canvas(ctx, participant_id, submission),
            (false, EntryKind::Text) => self.submit_guess(ctx, participant_id, submission),
            _ => Err(EngineError::NotEligible),
        }
    }

    fn next_phase(&self, current: Phase, turn: u32, total_turns: u32) -> NextPhase {
        match current {
            Phase::Drawing => NextPhase::Continue {
                phase: Phase::RoundResult,
                turn,
            },
            Phase::RoundResult if turn + 1 < total_turns => NextPhase::Continue {
                phase: Phase::Drawing,
                turn: turn + 1,
            },
            _ => NextPhase::Finished,
        }
    }

    fn build_result(&self, session: &Session, _chains: &ChainStore) -> SessionResult {
        SessionResult::Quiz {
            scores: self.scoreboard.standings(&session.participants),
            rounds: self.history.clone(),
        }
    }

    fn eligible_submitters(&self, session: &Session) -> Vec<ParticipantId> {
        match session.phase {
            Phase::Drawing => {
                let drawer = self.round.as_ref().map(|r| r.drawer.as_str());
                session
                    .present_seats()
                    .into_iter()
                    .filter(|p| Some(p.as_str()) != drawer)
                    .collect()
            }
            _ => session.present_seats(),
        }
    }

    fn required_submission_count(&self, session: &Session, phase: Phase) -> usize {
        match phase {
            Phase::Drawing => {
                let Some(round) = self.round.as_ref() else {
                    return 0;
                };
                if !session.is_present(&round.drawer) {
                    return 0;
                }
                // Winners who left still fill a slot but are no longer counted
                let departed = round
                    .winners
                    .iter()
                    .filter(|w| !session.is_present(&w.participant_id))
                    .count();
                self.eligible_submitters(session)
                    .len()
                    .min(self.settings.max_winners.max(1).saturating_sub(departed))
            }
            _ => self.eligible_submitters(session).len(),
        }
    }

    fn backfill(&mut self, ctx: ModeCtx<'_>, _missing: &[ParticipantId]) -> EngineResult<()> {
        // Guessers owe nothing; only an empty canvas gets a placeholder
        if ctx.session.phase != Phase::Drawing {
            return Ok(());
        }
        let Some(drawer) = self.round.as_ref().map(|r| r.drawer.clone()) else {
            return Ok(());
        };
        if Self::current_canvas(ctx.session, ctx.chains, &drawer)?.is_some() {
            return Ok(());
        }
        let Some(seat) = ctx.session.seat_of(&drawer) else {
            return Ok(());
        };
        ctx.chains.upsert(
            seat,
            EntryKey {
                author: &drawer,
                kind: EntryKind::Drawing,
                phase_seq: ctx.session.phase_seq,
            },
            String::new(),
            None,
            true,
            ctx.now,
        )?;
        Ok(())
    }

    fn on_phase_start(&mut self, ctx: ModeCtx<'_>) {
        let session = ctx.session;
        if session.phase != Phase::Drawing {
            if let Some(reveal) = self.reveal_message(session) {
                ctx.out.broadcast(reveal);
            }
            return;
        }
        self.round = None;
        let Some(drawer) = Self::current_drawer(session) else {
            return;
        };

        let prompt = self.pick_prompt();
        self.scoreboard.begin_round();
        self.feed.clear();
        self.round = Some(QuizRound {
            round: session.turn + 1,
            drawer: drawer.clone(),
            prompt,
            hint_revealed: false,
            winners: Vec::new(),
            canvas_hidden: false,
        });
        tracing::info!(
            "Quiz round {}/{} drawn by {}",
            session.turn + 1,
            session.total_turns,
            drawer
        );

        for participant_id in session.present_seats() {
            if let Some(message) = self.round_message(session, &participant_id) {
                ctx.out.send_to(&participant_id, message);
            }
        }
    }

    fn on_phase_end(&mut self, ctx: ModeCtx<'_>) {
        let session = ctx.session;
        if session.phase != Phase::Drawing {
            return;
        }
        let Some(round) = self.round.as_ref() else {
            return;
        };

        if round.winners.is_empty() {
            let guessers: Vec<ParticipantId> = session
                .present_seats()
                .into_iter()
                .filter(|p| *p != round.drawer)
                .collect();
            self.scoreboard.award_consolation(&self.settings, &guessers);
        }

        self.history.push(QuizRoundSummary {
            round: round.round,
            drawer: round.drawer.clone(),
            answer: round.prompt.answer.clone(),
            winners: round.winners.clone(),
        });
    }

    fn accepts_acknowledgement(&self, phase: Phase) -> bool {
        phase == Phase::RoundResult
    }

    fn resume_messages(&self, session: &Session, participant_id: &str) -> Vec<ServerMessage> {
        match session.phase {
            Phase::Drawing => {
                let mut messages: Vec<ServerMessage> =
                    self.round_message(session, participant_id).into_iter().collect();
                messages.extend(
                    self.feed
                        .iter()
                        .cloned()
                        .map(|item| ServerMessage::QuizActivity { item }),
                );
                messages
            }
            Phase::RoundResult => self.reveal_message(session).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}
