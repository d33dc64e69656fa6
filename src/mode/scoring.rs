//! Quiz scoring: rank-indexed points, a one-off drawer bonus, consolation
//! points for rounds nobody solves, and a per-round cap per participant.

use crate::types::*;
use std::collections::HashMap;

/// Points handed out for one correct guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Award {
    pub rank: usize,
    pub guesser_points: u32,
    pub drawer_points: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Scoreboard {
    totals: HashMap<ParticipantId, u32>,
    /// Points granted in the current round, for cap enforcement
    round_awards: HashMap<ParticipantId, u32>,
}

impl Scoreboard {
    /// Fresh board with everyone at zero
    pub fn with_participants(ids: &[ParticipantId]) -> Self {
        Self {
            totals: ids.iter().map(|id| (id.clone(), 0)).collect(),
            round_awards: HashMap::new(),
        }
    }

    pub fn begin_round(&mut self) {
        self.round_awards.clear();
    }

    pub fn total(&self, participant_id: &str) -> u32 {
        self.totals.get(participant_id).copied().unwrap_or(0)
    }

    /// Add up to `points`, never letting one participant exceed `cap` in the round
    fn grant(&mut self, participant_id: &str, points: u32, cap: u32) -> u32 {
        let this_round = self.round_awards.entry(participant_id.to_string()).or_insert(0);
        let granted = points.min(cap.saturating_sub(*this_round));
        *this_round += granted;
        *self.totals.entry(participant_id.to_string()).or_insert(0) += granted;
        granted
    }

    /// Score the `rank`-th (0-based) correct guess of the round
    pub fn award_correct(
        &mut self,
        settings: &QuizSettings,
        drawer: &str,
        guesser: &str,
        rank: usize,
    ) -> Award {
        let drawer_points = if rank == 0 {
            self.grant(drawer, settings.drawer_bonus, settings.per_round_cap)
        } else {
            0
        };
        let table_points = settings.winner_points.get(rank).copied().unwrap_or(0);
        let guesser_points = self.grant(guesser, table_points, settings.per_round_cap);

        Award {
            rank,
            guesser_points,
            drawer_points,
        }
    }

    /// Flat points for everyone who guessed in a round nobody solved
    pub fn award_consolation(&mut self, settings: &QuizSettings, participants: &[ParticipantId]) {
        for participant_id in participants {
            self.grant(
                participant_id,
                settings.consolation_points,
                settings.per_round_cap,
            );
        }
    }

    /// Leaderboard sorted by total descending, ties by roster order
    pub fn standings(&self, roster: &[Participant]) -> Vec<ScoreLine> {
        let mut lines: Vec<ScoreLine> = self
            .totals
            .iter()
            .map(|(id, total)| ScoreLine {
                participant_id: id.clone(),
                display_name: roster
                    .iter()
                    .find(|p| &p.id == id)
                    .map(|p| p.display_name.clone()),
                total: *total,
            })
            .collect();

        let position = |id: &str| roster.iter().position(|p| p.id == id).unwrap_or(usize::MAX);
        lines.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| position(&a.participant_id).cmp(&position(&b.participant_id)))
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ParticipantId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ranked_awards_and_single_drawer_bonus() {
        let settings = QuizSettings::default();
        let mut board = Scoreboard::with_participants(&ids(&["d", "a", "b", "c"]));
        board.begin_round();

        let first = board.award_correct(&settings, "d", "a", 0);
        let second = board.award_correct(&settings, "d", "b", 1);
        let third = board.award_correct(&settings, "d", "c", 2);

        assert_eq!(first.drawer_points, 2);
        assert_eq!(second.drawer_points, 0);
        assert_eq!(third.drawer_points, 0);
        assert_eq!(board.total("a"), 3);
        assert_eq!(board.total("b"), 2);
        assert_eq!(board.total("c"), 1);
        assert_eq!(board.total("d"), 2);
    }

    #[test]
    fn test_rank_past_table_scores_zero() {
        let settings = QuizSettings::default();
        let mut board = Scoreboard::default();
        let award = board.award_correct(&settings, "d", "e", 5);
        assert_eq!(award.guesser_points, 0);
    }

    #[test]
    fn test_per_round_cap_is_enforced() {
        let settings = QuizSettings {
            winner_points: vec![10],
            drawer_bonus: 8,
            per_round_cap: 4,
            ..Default::default()
        };
        let mut board = Scoreboard::default();
        board.begin_round();
        let award = board.award_correct(&settings, "d", "a", 0);
        assert_eq!(award.guesser_points, 4);
        assert_eq!(award.drawer_points, 4);

        board.begin_round();
        board.award_correct(&settings, "d", "a", 0);
        assert_eq!(board.total("a"), 8);
    }

    #[test]
    fn test_consolation() {
        let settings = QuizSettings::default();
        let mut board = Scoreboard::with_participants(&ids(&["d", "a", "b"]));
        board.begin_round();
        board.award_consolation(&settings, &ids(&["a", "b"]));
        assert_eq!(board.total("a"), 1);
        assert_eq!(board.total("b"), 1);
        assert_eq!(board.total("d"), 0);
    }

    #[test]
    fn test_standings_sorted_desc() {
        let settings = QuizSettings::default();
        let mut board = Scoreboard::with_participants(&ids(&["d", "a", "b"]));
        board.begin_round();
        board.award_correct(&settings, "d", "b", 0);
        board.award_correct(&settings, "d", "a", 1);

        let lines = board.standings(&[]);
        let order: Vec<&str> = lines.iter().map(|l| l.participant_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "d"]);
    }
}
