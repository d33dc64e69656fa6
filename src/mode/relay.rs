//! Telephone-style relay: prompt, then alternating drawing and guessing
//!
//! The turn counter advances on every phase. At turn `t` the participant in
//! seat `i` reads the last entry of chain `(i + t) mod N` and appends to that
//! same chain, so every chain passes through every seat exactly once over
//! `N` turns and nobody ever continues their own previous contribution.

use super::{rotate, ModeCtx, ModeStrategy, NextPhase, SubmissionOutcome, DEFAULT_TIME_LIMIT_SECS};
use crate::error::{EngineError, EngineResult};
use crate::protocol::ContentPayload;
use crate::state::chain::{ChainStore, EntryKey};
use crate::types::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RelayMode {
    pub settings: RelaySettings,
}

impl RelayMode {
    pub fn new(settings: RelaySettings) -> Self {
        Self { settings }
    }

    fn expected_kind(phase: Phase) -> Option<EntryKind> {
        match phase {
            Phase::Prompt | Phase::Guessing => Some(EntryKind::Text),
            Phase::Drawing => Some(EntryKind::Drawing),
            _ => None,
        }
    }

    /// Chain a seat works on during the current turn
    pub fn target_chain(session: &Session, seat: usize) -> usize {
        rotate(seat, session.turn, session.seats.len())
    }
}

impl ModeStrategy for RelayMode {
    fn initialize(&mut self, session: &mut Session) -> EngineResult<()> {
        session.phase = Phase::Prompt;
        session.turn = 0;
        session.total_turns = session.seats.len() as u32;
        Ok(())
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Prompt, Phase::Drawing, Phase::Guessing]
    }

    fn time_limit(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Prompt => self.settings.prompt_seconds,
            Phase::Drawing => self.settings.drawing_seconds,
            Phase::Guessing => self.settings.guessing_seconds,
            _ => DEFAULT_TIME_LIMIT_SECS,
        }
    }

    fn distribute_content(
        &self,
        session: &Session,
        chains: &ChainStore,
    ) -> EngineResult<HashMap<ParticipantId, ContentPayload>> {
        let mut content = HashMap::new();
        if session.phase == Phase::Prompt {
            return Ok(content);
        }

        for participant_id in session.present_seats() {
            let Some(seat) = session.seat_of(&participant_id) else {
                continue;
            };
            let chain = Self::target_chain(session, seat);
            if let Some(entry) = chains.last_entry(chain)? {
                content.insert(participant_id, ContentPayload::from_entry(entry));
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
        let session = ctx.session;
        let expected = Self::expected_kind(session.phase)
            .ok_or(EngineError::InvalidPhase(session.phase))?;
        if submission.kind != expected {
            return Err(EngineError::InvalidPhase(session.phase));
        }
        let seat = session
            .seat_of(participant_id)
            .ok_or(EngineError::NotEligible)?;

        let chain = Self::target_chain(session, seat);
        ctx.chains.upsert(
            chain,
            EntryKey {
                author: participant_id,
                kind: expected,
                phase_seq: session.phase_seq,
            },
            submission.payload,
            submission.strokes,
            false,
            ctx.now,
        )?;
        Ok(SubmissionOutcome::Counted)
    }

    fn next_phase(&self, _current: Phase, turn: u32, total_turns: u32) -> NextPhase {
        let next = turn + 1;
        if next >= total_turns {
            return NextPhase::Finished;
        }
        let phase = if next % 2 == 1 {
            Phase::Drawing
        } else {
            Phase::Guessing
        };
        NextPhase::Continue { phase, turn: next }
    }

    fn build_result(&self, session: &Session, chains: &ChainStore) -> SessionResult {
        SessionResult::Chains {
            mode: GameMode::Relay,
            chains: chains.all().to_vec(),
            roster: session.participants.clone(),
        }
    }

    fn backfill(&mut self, ctx: ModeCtx<'_>, missing: &[ParticipantId]) -> EngineResult<()> {
        let Some(kind) = Self::expected_kind(ctx.session.phase) else {
            return Ok(());
        };
        for participant_id in missing {
            let Some(seat) = ctx.session.seat_of(participant_id) else {
                continue;
            };
            let chain = Self::target_chain(ctx.session, seat);
            ctx.chains.upsert(
                chain,
                EntryKey {
                    author: participant_id,
                    kind,
                    phase_seq: ctx.session.phase_seq,
                },
                String::new(),
                None,
                true,
                ctx.now,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Outbox;
    use crate::mode::test_support::seated_session;
    use chrono::Utc;
    use std::collections::HashSet;

    fn submit(
        mode: &mut RelayMode,
        session: &Session,
        chains: &mut ChainStore,
        who: &str,
        submission: Submission,
    ) -> EngineResult<SubmissionOutcome> {
        let mut out = Outbox::default();
        mode.handle_submission(
            ModeCtx {
                session,
                chains,
                out: &mut out,
                now: Utc::now(),
            },
            who,
            submission,
        )
    }

    #[test]
    fn test_routing_is_a_bijection_every_turn() {
        for n in 2..=8 {
            let mut session = seated_session(n);
            let mut seen: Vec<HashSet<usize>> = vec![HashSet::new(); n];
            for t in 0..n as u32 {
                session.turn = t;
                let targets: HashSet<usize> =
                    (0..n).map(|i| RelayMode::target_chain(&session, i)).collect();
                assert_eq!(targets.len(), n, "turn {} of {} is not a bijection", t, n);
                for i in 0..n {
                    seen[RelayMode::target_chain(&session, i)].insert(i);
                }
            }
            for (chain, visitors) in seen.iter().enumerate() {
                assert_eq!(visitors.len(), n, "chain {} missed a participant", chain);
            }
        }
    }

    #[test]
    fn test_no_one_continues_their_own_previous_entry() {
        let n = 5;
        let mut session = seated_session(n);
        for t in 1..n as u32 {
            for i in 0..n {
                session.turn = t - 1;
                let before = RelayMode::target_chain(&session, i);
                session.turn = t;
                assert_ne!(before, RelayMode::target_chain(&session, i));
            }
        }
    }

    #[test]
    fn test_phase_graph() {
        let mode = RelayMode::default();
        assert_eq!(
            mode.next_phase(Phase::Prompt, 0, 4),
            NextPhase::Continue {
                phase: Phase::Drawing,
                turn: 1
            }
        );
        assert_eq!(
            mode.next_phase(Phase::Drawing, 1, 4),
            NextPhase::Continue {
                phase: Phase::Guessing,
                turn: 2
            }
        );
        assert_eq!(
            mode.next_phase(Phase::Guessing, 2, 4),
            NextPhase::Continue {
                phase: Phase::Drawing,
                turn: 3
            }
        );
        assert_eq!(mode.next_phase(Phase::Drawing, 3, 4), NextPhase::Finished);
    }

    #[test]
    fn test_submission_kind_must_match_phase() {
        let mut mode = RelayMode::default();
        let mut session = seated_session(3);
        mode.initialize(&mut session).unwrap();
        let mut chains = ChainStore::for_seats(&session.seats);

        let result = submit(
            &mut mode,
            &session,
            &mut chains,
            "p0",
            Submission::drawing("img"),
        );
        assert_eq!(result, Err(EngineError::InvalidPhase(Phase::Prompt)));

        let result = submit(
            &mut mode,
            &session,
            &mut chains,
            "stranger",
            Submission::text("hi"),
        );
        assert_eq!(result, Err(EngineError::NotEligible));
    }

    #[test]
    fn test_drawing_turn_reads_next_chain() {
        let mut mode = RelayMode::default();
        let mut session = seated_session(3);
        mode.initialize(&mut session).unwrap();
        session.phase_seq = 1;
        let mut chains = ChainStore::for_seats(&session.seats);

        for i in 0..3 {
            submit(
                &mut mode,
                &session,
                &mut chains,
                &format!("p{}", i),
                Submission::text(format!("prompt {}", i)),
            )
            .unwrap();
        }

        session.phase = Phase::Drawing;
        session.turn = 1;
        let content = mode.distribute_content(&session, &chains).unwrap();
        assert_eq!(content["p0"], ContentPayload::Text("prompt 1".into()));
        assert_eq!(content["p2"], ContentPayload::Text("prompt 0".into()));
    }

    #[test]
    fn test_backfill_writes_placeholders() {
        let mut mode = RelayMode::default();
        let mut session = seated_session(2);
        mode.initialize(&mut session).unwrap();
        session.phase_seq = 1;
        let mut chains = ChainStore::for_seats(&session.seats);
        let mut out = Outbox::default();

        mode.backfill(
            ModeCtx {
                session: &session,
                chains: &mut chains,
                out: &mut out,
                now: Utc::now(),
            },
            &["p1".to_string()],
        )
        .unwrap();

        let entry = chains.last_entry(1).unwrap().unwrap();
        assert!(entry.placeholder);
        assert_eq!(entry.author, "p1");
        assert!(chains.last_entry(0).unwrap().is_none());
    }
}
