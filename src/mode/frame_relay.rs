//! Frame-relay animation: everyone draws a first frame, then continues
//! someone else's animation one frame at a time.

use super::{rotate, ModeCtx, ModeStrategy, NextPhase, SubmissionOutcome, DEFAULT_TIME_LIMIT_SECS};
use crate::error::{EngineError, EngineResult};
use crate::protocol::ContentPayload;
use crate::state::chain::{ChainStore, EntryKey};
use crate::types::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct FrameRelayMode {
    pub settings: FrameRelaySettings,
}

impl FrameRelayMode {
    pub fn new(settings: FrameRelaySettings) -> Self {
        Self { settings }
    }

    /// First frame stays in the seat's own chain; drawing turns rotate by `turn + 1`
    pub fn target_chain(session: &Session, seat: usize) -> usize {
        match session.phase {
            Phase::FirstFrame => seat,
            _ => rotate(seat, session.turn + 1, session.seats.len()),
        }
    }

    fn preview(&self, chain: &Chain) -> Option<ContentPayload> {
        let frames: Vec<String> = chain.entries.iter().map(|e| e.payload.clone()).collect();
        let background = frames.last()?.clone();
        Some(match self.settings.preview {
            FramePreview::Background => {
                ContentPayload::FrameSequenceWithBackground { frames, background }
            }
            FramePreview::Sequence => ContentPayload::FrameSequence(frames),
        })
    }
}

impl ModeStrategy for FrameRelayMode {
    fn initialize(&mut self, session: &mut Session) -> EngineResult<()> {
        session.phase = Phase::FirstFrame;
        session.turn = 0;
        session.total_turns = session.seats.len().saturating_sub(1) as u32;
        Ok(())
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::FirstFrame, Phase::Drawing]
    }

    fn time_limit(&self, phase: Phase) -> u32 {
        match phase {
            Phase::FirstFrame => self.settings.first_frame_seconds,
            Phase::Drawing => self.settings.drawing_seconds,
            _ => DEFAULT_TIME_LIMIT_SECS,
        }
    }

    fn distribute_content(
        &self,
        session: &Session,
        chains: &ChainStore,
    ) -> EngineResult<HashMap<ParticipantId, ContentPayload>> {
        let mut content = HashMap::new();
        if session.phase != Phase::Drawing {
            return Ok(content);
        }

        for participant_id in session.present_seats() {
            let Some(seat) = session.seat_of(&participant_id) else {
                continue;
            };
            let chain = chains.get(Self::target_chain(session, seat))?;
            if let Some(payload) = self.preview(chain) {
                content.insert(participant_id, payload);
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
        if !matches!(session.phase, Phase::FirstFrame | Phase::Drawing) {
            return Err(EngineError::InvalidPhase(session.phase));
        }
        if submission.kind != EntryKind::Frame {
            return Err(EngineError::InvalidPhase(session.phase));
        }
        let seat = session
            .seat_of(participant_id)
            .ok_or(EngineError::NotEligible)?;

        ctx.chains.upsert(
            Self::target_chain(session, seat),
            EntryKey {
                author: participant_id,
                kind: EntryKind::Frame,
                phase_seq: session.phase_seq,
            },
            submission.payload,
            submission.strokes,
            false,
            ctx.now,
        )?;
        Ok(SubmissionOutcome::Counted)
    }

    fn next_phase(&self, current: Phase, turn: u32, total_turns: u32) -> NextPhase {
        match current {
            Phase::FirstFrame if total_turns > 0 => NextPhase::Continue {
                phase: Phase::Drawing,
                turn: 0,
            },
            Phase::Drawing if turn + 1 < total_turns => NextPhase::Continue {
                phase: Phase::Drawing,
                turn: turn + 1,
            },
            _ => NextPhase::Finished,
        }
    }

    fn build_result(&self, session: &Session, chains: &ChainStore) -> SessionResult {
        SessionResult::Chains {
            mode: GameMode::FrameRelay,
            chains: chains.all().to_vec(),
            roster: session.participants.clone(),
        }
    }

    fn backfill(&mut self, ctx: ModeCtx<'_>, missing: &[ParticipantId]) -> EngineResult<()> {
        for participant_id in missing {
            let Some(seat) = ctx.session.seat_of(participant_id) else {
                continue;
            };
            let chain = Self::target_chain(ctx.session, seat);
            // Repeat the previous frame so the animation holds still instead of going blank
            let held = ctx
                .chains
                .last_entry(chain)?
                .map(|e| e.payload.clone())
                .unwrap_or_default();
            ctx.chains.upsert(
                chain,
                EntryKey {
                    author: participant_id,
                    kind: EntryKind::Frame,
                    phase_seq: ctx.session.phase_seq,
                },
                held,
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

    fn frame(mode: &mut FrameRelayMode, session: &Session, chains: &mut ChainStore, who: &str, data: &str) {
        let mut out = Outbox::default();
        mode.handle_submission(
            ModeCtx {
                session,
                chains,
                out: &mut out,
                now: Utc::now(),
            },
            who,
            Submission::frame(data),
        )
        .unwrap();
    }

    #[test]
    fn test_first_frame_seeds_own_chain() {
        let mut mode = FrameRelayMode::default();
        let mut session = seated_session(3);
        mode.initialize(&mut session).unwrap();
        assert_eq!(session.total_turns, 2);
        let mut chains = ChainStore::for_seats(&session.seats);

        frame(&mut mode, &session, &mut chains, "p1", "f1");
        assert_eq!(chains.get(1).unwrap().entries[0].payload, "f1");
    }

    #[test]
    fn test_drawing_rotates_by_turn_plus_one() {
        let mut mode = FrameRelayMode::default();
        let mut session = seated_session(3);
        mode.initialize(&mut session).unwrap();
        session.phase_seq = 1;
        let mut chains = ChainStore::for_seats(&session.seats);
        for i in 0..3 {
            frame(&mut mode, &session, &mut chains, &format!("p{}", i), &format!("f{}", i));
        }

        session.phase = Phase::Drawing;
        session.turn = 0;
        session.phase_seq = 2;
        let content = mode.distribute_content(&session, &chains).unwrap();
        assert_eq!(
            content["p0"],
            ContentPayload::FrameSequenceWithBackground {
                frames: vec!["f1".into()],
                background: "f1".into()
            }
        );

        frame(&mut mode, &session, &mut chains, "p0", "f1b");
        assert_eq!(chains.get(1).unwrap().entries.len(), 2);
    }

    #[test]
    fn test_sequence_preview() {
        let mut mode = FrameRelayMode::new(FrameRelaySettings {
            preview: FramePreview::Sequence,
            ..Default::default()
        });
        let mut session = seated_session(2);
        mode.initialize(&mut session).unwrap();
        session.phase_seq = 1;
        let mut chains = ChainStore::for_seats(&session.seats);
        frame(&mut mode, &session, &mut chains, "p0", "a");
        frame(&mut mode, &session, &mut chains, "p1", "b");

        session.phase = Phase::Drawing;
        let content = mode.distribute_content(&session, &chains).unwrap();
        assert_eq!(content["p1"], ContentPayload::FrameSequence(vec!["a".into()]));
    }

    #[test]
    fn test_text_is_rejected() {
        let mut mode = FrameRelayMode::default();
        let mut session = seated_session(2);
        mode.initialize(&mut session).unwrap();
        let mut chains = ChainStore::for_seats(&session.seats);
        let mut out = Outbox::default();
        let result = mode.handle_submission(
            ModeCtx {
                session: &session,
                chains: &mut chains,
                out: &mut out,
                now: Utc::now(),
            },
            "p0",
            Submission::text("nope"),
        );
        assert_eq!(result, Err(EngineError::InvalidPhase(Phase::FirstFrame)));
    }

    #[test]
    fn test_phase_graph() {
        let mode = FrameRelayMode::default();
        assert_eq!(
            mode.next_phase(Phase::FirstFrame, 0, 2),
            NextPhase::Continue {
                phase: Phase::Drawing,
                turn: 0
            }
        );
        assert_eq!(
            mode.next_phase(Phase::Drawing, 0, 2),
            NextPhase::Continue {
                phase: Phase::Drawing,
                turn: 1
            }
        );
        assert_eq!(mode.next_phase(Phase::Drawing, 1, 2), NextPhase::Finished);
    }
}
