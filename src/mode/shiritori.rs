//! Drawing shiritori
//!
//! One drawer at a time, one `Drawing` phase per slot. A drawer first hands in
//! only the picture, which immediately passes the pen to the next seat; the
//! word that names the picture follows whenever the drawer is ready. Words
//! still owed after the last slot are collected in a `WordCompletion` phase.

use super::kana;
use super::{ModeCtx, ModeStrategy, NextPhase, SubmissionOutcome, DEFAULT_TIME_LIMIT_SECS};
use crate::error::{EngineError, EngineResult};
use crate::protocol::{ContentPayload, ServerMessage};
use crate::state::chain::{ChainStore, EntryKey};
use crate::types::*;
use std::collections::HashMap;

/// Chain entry written for a word that never arrived
const MISSING_WORD: &str = "?";

#[derive(Debug, Clone, PartialEq)]
pub struct ShiritoriLink {
    pub slot: u32,
    pub drawer: ParticipantId,
    pub drawing: Option<String>,
    pub word: Option<String>,
    pub skipped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShiritoriMode {
    pub settings: ShiritoriSettings,
    links: Vec<ShiritoriLink>,
    /// Drawings still waiting for their word, by drawer → index into `links`
    pending: HashMap<ParticipantId, usize>,
    /// Drawers who named their drawing during the open `WordCompletion` phase
    named: Vec<ParticipantId>,
}

impl ShiritoriMode {
    pub fn new(settings: ShiritoriSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn links(&self) -> &[ShiritoriLink] {
        &self.links
    }

    pub fn has_pending(&self, participant_id: &str) -> bool {
        self.pending.contains_key(participant_id)
    }

    /// Drawer for the current slot, skipping seats that have left
    pub fn current_drawer(session: &Session) -> Option<ParticipantId> {
        if session.seats.is_empty() {
            return None;
        }
        session
            .present_seat_from(session.turn as usize % session.seats.len())
            .cloned()
    }

    fn last_drawing(&self) -> Option<&String> {
        self.links.iter().rev().find_map(|l| l.drawing.as_ref())
    }

    fn submit_drawing(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        let session = ctx.session;
        if session.phase != Phase::Drawing {
            return Err(EngineError::InvalidPhase(session.phase));
        }
        if session.turn >= session.total_turns {
            return Err(EngineError::NotEligible);
        }
        if Self::current_drawer(session).as_deref() != Some(participant_id) {
            return Err(EngineError::NotEligible);
        }
        if self.pending.contains_key(participant_id) {
            return Err(EngineError::ValidationFailed(
                "Name your previous drawing first".to_string(),
            ));
        }
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

        self.links.push(ShiritoriLink {
            slot: session.turn,
            drawer: participant_id.to_string(),
            drawing: Some(submission.payload),
            word: None,
            skipped: false,
        });
        self.pending
            .insert(participant_id.to_string(), self.links.len() - 1);

        tracing::debug!(
            "Shiritori slot {} drawn by {}, word pending",
            session.turn,
            participant_id
        );
        Ok(SubmissionOutcome::Counted)
    }

    fn submit_word(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        let session = ctx.session;
        let index = *self
            .pending
            .get(participant_id)
            .ok_or(EngineError::NotEligible)?;

        let word = submission.payload.trim().to_string();
        if !kana::is_valid_word(&word) {
            return Err(EngineError::ValidationFailed(
                "Words may only use hiragana, katakana and ー".to_string(),
            ));
        }
        if word.chars().count() > self.settings.max_word_length {
            return Err(EngineError::ValidationFailed(format!(
                "Words are limited to {} characters",
                self.settings.max_word_length
            )));
        }
        let seat = session
            .seat_of(participant_id)
            .ok_or(EngineError::NotEligible)?;

        ctx.chains.upsert(
            seat,
            EntryKey {
                author: participant_id,
                kind: EntryKind::Text,
                phase_seq: session.phase_seq,
            },
            word.clone(),
            None,
            false,
            ctx.now,
        )?;

        let link = &mut self.links[index];
        link.word = Some(word.clone());
        let slot = link.slot;
        self.pending.remove(participant_id);

        ctx.out
            .send_to(participant_id, ServerMessage::WordAccepted { slot, word });

        if session.phase == Phase::WordCompletion {
            self.named.push(participant_id.to_string());
            Ok(SubmissionOutcome::Counted)
        } else {
            Ok(SubmissionOutcome::Uncounted)
        }
    }
}

impl ModeStrategy for ShiritoriMode {
    fn initialize(&mut self, session: &mut Session) -> EngineResult<()> {
        self.links.clear();
        self.pending.clear();
        self.named.clear();
        session.phase = Phase::Drawing;
        session.turn = 0;
        session.total_turns = self.settings.rounds.max(1) * session.seats.len() as u32;
        Ok(())
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Drawing, Phase::WordCompletion]
    }

    fn time_limit(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Drawing => self.settings.drawing_seconds,
            Phase::WordCompletion => self.settings.word_seconds,
            _ => DEFAULT_TIME_LIMIT_SECS,
        }
    }

    fn distribute_content(
        &self,
        session: &Session,
        _chains: &ChainStore,
    ) -> EngineResult<HashMap<ParticipantId, ContentPayload>> {
        let mut content = HashMap::new();
        match session.phase {
            Phase::Drawing => {
                if let (Some(drawer), Some(previous)) =
                    (Self::current_drawer(session), self.last_drawing())
                {
                    content.insert(drawer, ContentPayload::Drawing(previous.clone()));
                }
            }
            Phase::WordCompletion => {
                for (participant_id, &index) in &self.pending {
                    if let Some(drawing) = &self.links[index].drawing {
                        content.insert(
                            participant_id.clone(),
                            ContentPayload::Drawing(drawing.clone()),
                        );
                    }
                }
            }
            _ => {}
        }
        Ok(content)
    }

    fn handle_submission(
        &mut self,
        ctx: ModeCtx<'_>,
        participant_id: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        match submission.kind {
            EntryKind::Drawing => self.submit_drawing(ctx, participant_id, submission),
            EntryKind::Text => self.submit_word(ctx, participant_id, submission),
            EntryKind::Frame => Err(EngineError::InvalidPhase(ctx.session.phase)),
        }
    }

    fn next_phase(&self, current: Phase, turn: u32, total_turns: u32) -> NextPhase {
        match current {
            Phase::Drawing if turn + 1 < total_turns => NextPhase::Continue {
                phase: Phase::Drawing,
                turn: turn + 1,
            },
            Phase::Drawing if !self.pending.is_empty() => NextPhase::Continue {
                phase: Phase::WordCompletion,
                turn,
            },
            _ => NextPhase::Finished,
        }
    }

    fn build_result(&self, session: &Session, _chains: &ChainStore) -> SessionResult {
        let mut links = Vec::with_capacity(self.links.len());
        let mut previous_word: Option<&String> = None;
        let mut connected_count = 0;

        for link in &self.links {
            let connects_previous = match (previous_word, &link.word) {
                (Some(prev), Some(word)) => Some(kana::connects(prev, word)),
                _ => None,
            };
            if connects_previous == Some(true) {
                connected_count += 1;
            }
            links.push(ShiritoriLinkView {
                slot: link.slot,
                drawer: link.drawer.clone(),
                drawing: link.drawing.clone(),
                word: link.word.clone(),
                skipped: link.skipped,
                connects_previous,
                ends_with_n: link.word.as_deref().is_some_and(kana::ends_with_n),
            });
            if !link.skipped {
                previous_word = link.word.as_ref();
            }
        }

        let complete = self
            .links
            .iter()
            .all(|l| l.skipped || l.word.is_some());

        SessionResult::Shiritori {
            links,
            connected_count,
            complete,
            roster: session.participants.clone(),
        }
    }

    fn eligible_submitters(&self, session: &Session) -> Vec<ParticipantId> {
        match session.phase {
            Phase::Drawing => Self::current_drawer(session).into_iter().collect(),
            // Words owed when the phase opened, named or not
            Phase::WordCompletion => session
                .present_seats()
                .into_iter()
                .filter(|p| self.pending.contains_key(p) || self.named.contains(p))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn backfill(&mut self, ctx: ModeCtx<'_>, missing: &[ParticipantId]) -> EngineResult<()> {
        if ctx.session.phase != Phase::WordCompletion {
            return Ok(());
        }
        for participant_id in missing {
            if self.pending.remove(participant_id).is_none() {
                continue;
            }
            let Some(seat) = ctx.session.seat_of(participant_id) else {
                continue;
            };
            ctx.chains.upsert(
                seat,
                EntryKey {
                    author: participant_id,
                    kind: EntryKind::Text,
                    phase_seq: ctx.session.phase_seq,
                },
                MISSING_WORD.to_string(),
                None,
                true,
                ctx.now,
            )?;
        }
        Ok(())
    }

    fn on_phase_start(&mut self, _ctx: ModeCtx<'_>) {
        self.named.clear();
    }

    fn on_phase_end(&mut self, ctx: ModeCtx<'_>) {
        let session = ctx.session;
        if session.phase != Phase::Drawing {
            return;
        }
        let drawn = self.links.last().is_some_and(|l| l.slot == session.turn);
        if !drawn && !session.seats.is_empty() {
            let drawer = Self::current_drawer(session).unwrap_or_else(|| {
                session.seats[session.turn as usize % session.seats.len()].clone()
            });
            tracing::info!("Shiritori slot {} skipped ({})", session.turn, drawer);
            self.links.push(ShiritoriLink {
                slot: session.turn,
                drawer,
                drawing: None,
                word: None,
                skipped: true,
            });
        }
    }

    fn on_participant_removed(&mut self, participant_id: &str) {
        self.pending.remove(participant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Outbox;
    use crate::mode::test_support::seated_session;
    use chrono::Utc;

    struct Table {
        mode: ShiritoriMode,
        session: Session,
        chains: ChainStore,
        out: Outbox,
    }

    impl Table {
        fn new(n: usize) -> Self {
            let mut mode = ShiritoriMode::default();
            let mut session = seated_session(n);
            mode.initialize(&mut session).unwrap();
            session.phase_seq = 1;
            let chains = ChainStore::for_seats(&session.seats);
            Self {
                mode,
                session,
                chains,
                out: Outbox::default(),
            }
        }

        fn submit(&mut self, who: &str, submission: Submission) -> EngineResult<SubmissionOutcome> {
            self.mode.handle_submission(
                ModeCtx {
                    session: &self.session,
                    chains: &mut self.chains,
                    out: &mut self.out,
                    now: Utc::now(),
                },
                who,
                submission,
            )
        }

        fn end_phase(&mut self) -> NextPhase {
            self.mode.on_phase_end(ModeCtx {
                session: &self.session,
                chains: &mut self.chains,
                out: &mut self.out,
                now: Utc::now(),
            });
            let next = self.mode.next_phase(
                self.session.phase,
                self.session.turn,
                self.session.total_turns,
            );
            if let NextPhase::Continue { phase, turn } = next {
                self.session.phase = phase;
                self.session.turn = turn;
                self.session.phase_seq += 1;
            }
            next
        }
    }

    #[test]
    fn test_only_current_drawer_may_draw() {
        let mut table = Table::new(3);
        assert_eq!(
            table.submit("p1", Submission::drawing("img")),
            Err(EngineError::NotEligible)
        );
        assert_eq!(
            table.submit("p0", Submission::drawing("img")),
            Ok(SubmissionOutcome::Counted)
        );
        assert!(table.mode.has_pending("p0"));
    }

    #[test]
    fn test_word_after_pen_passed() {
        let mut table = Table::new(2);
        table.submit("p0", Submission::drawing("apple")).unwrap();
        table.end_phase();
        assert_eq!(
            ShiritoriMode::current_drawer(&table.session).as_deref(),
            Some("p1")
        );

        // p0 names their drawing while p1 is already drawing
        assert_eq!(
            table.submit("p0", Submission::text("りんご")),
            Ok(SubmissionOutcome::Uncounted)
        );
        assert!(!table.mode.has_pending("p0"));
        assert_eq!(table.mode.links()[0].word.as_deref(), Some("りんご"));
    }

    #[test]
    fn test_word_script_validation() {
        let mut table = Table::new(2);
        table.submit("p0", Submission::drawing("apple")).unwrap();
        assert!(matches!(
            table.submit("p0", Submission::text("apple")),
            Err(EngineError::ValidationFailed(_))
        ));
        assert!(table.mode.has_pending("p0"));
        assert_eq!(
            table.submit("p1", Submission::text("りんご")),
            Err(EngineError::NotEligible)
        );
    }

    #[test]
    fn test_pending_word_blocks_next_drawing() {
        let mut table = Table::new(1);
        table.session.total_turns = 2;
        table.submit("p0", Submission::drawing("a")).unwrap();
        table.end_phase();
        assert!(matches!(
            table.submit("p0", Submission::drawing("b")),
            Err(EngineError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_drawer_sees_previous_drawing() {
        let mut table = Table::new(3);
        table.submit("p0", Submission::drawing("first")).unwrap();
        table.end_phase();
        let content = table
            .mode
            .distribute_content(&table.session, &table.chains)
            .unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content["p1"], ContentPayload::Drawing("first".into()));
    }

    #[test]
    fn test_word_completion_then_report() {
        let mut table = Table::new(3);
        table.submit("p0", Submission::drawing("apple")).unwrap();
        table.submit("p0", Submission::text("りんご")).unwrap();
        table.end_phase();
        table.submit("p1", Submission::drawing("gorilla")).unwrap();
        table.end_phase();
        // p2 times out: slot skipped
        assert_eq!(
            table.end_phase(),
            NextPhase::Continue {
                phase: Phase::WordCompletion,
                turn: 2
            }
        );
        assert_eq!(
            table.mode.eligible_submitters(&table.session),
            vec!["p1".to_string()]
        );
        assert_eq!(
            table.submit("p1", Submission::text("ゴリラ")),
            Ok(SubmissionOutcome::Counted)
        );
        assert_eq!(table.end_phase(), NextPhase::Finished);

        match table.mode.build_result(&table.session, &table.chains) {
            SessionResult::Shiritori {
                links,
                connected_count,
                complete,
                ..
            } => {
                assert_eq!(links.len(), 3);
                assert_eq!(links[1].connects_previous, Some(true));
                assert!(links[2].skipped);
                assert_eq!(connected_count, 1);
                assert!(complete);
            }
            other => panic!("Expected shiritori report, got {:?}", other),
        }
    }

    #[test]
    fn test_word_completion_waits_for_every_owed_word() {
        let mut table = Table::new(3);
        for (who, drawing) in [("p0", "apple"), ("p1", "gorilla"), ("p2", "trumpet")] {
            table.submit(who, Submission::drawing(drawing)).unwrap();
            table.end_phase();
        }
        assert_eq!(table.session.phase, Phase::WordCompletion);
        assert_eq!(table.mode.eligible_submitters(&table.session).len(), 3);

        table.submit("p0", Submission::text("りんご")).unwrap();
        table.submit("p1", Submission::text("ゴリラ")).unwrap();
        // Named words keep their place in the required set
        assert_eq!(
            table
                .mode
                .required_submission_count(&table.session, Phase::WordCompletion),
            3
        );
        assert_eq!(
            table.submit("p2", Submission::text("らっぱ")),
            Ok(SubmissionOutcome::Counted)
        );

        match table.mode.build_result(&table.session, &table.chains) {
            SessionResult::Shiritori {
                connected_count,
                complete,
                ..
            } => {
                assert_eq!(connected_count, 2);
                assert!(complete);
            }
            other => panic!("Expected shiritori report, got {:?}", other),
        }
    }

    #[test]
    fn test_word_timeout_leaves_report_incomplete() {
        let mut table = Table::new(2);
        table.submit("p0", Submission::drawing("a")).unwrap();
        table.end_phase();
        table.submit("p1", Submission::text("x")).unwrap_err();
        table.end_phase();
        assert_eq!(table.session.phase, Phase::WordCompletion);

        let missing = table.mode.eligible_submitters(&table.session);
        assert_eq!(missing, vec!["p0".to_string()]);
        table
            .mode
            .backfill(
                ModeCtx {
                    session: &table.session,
                    chains: &mut table.chains,
                    out: &mut table.out,
                    now: Utc::now(),
                },
                &missing,
            )
            .unwrap();

        match table.mode.build_result(&table.session, &table.chains) {
            SessionResult::Shiritori { complete, .. } => assert!(!complete),
            other => panic!("Expected shiritori report, got {:?}", other),
        }
        let entry = table.chains.last_entry(0).unwrap().unwrap();
        assert!(entry.placeholder);
        assert_eq!(entry.payload, "?");
    }
}
