//! Rating updates from finished matches
//!
//! Every player on the winning team gains one score point and `mmr_per_game`
//! rating, every loser gives the same back. On top of that the lower rated
//! team gains the underdog bonus and the favoured team loses it.

use crate::balancer::TeamSplit;
use crate::config::RatingConfig;
use crate::error::LadderError;
use crate::types::{MatchId, Player, PlayerId, Rating};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One entry of the append-only rating ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub score_change: i32,
    pub mmr_change: Rating,
    pub match_id: Option<MatchId>,
    pub info: String,
    pub season: u32,
    pub created_at: DateTime<Utc>,
}

impl ScoreChange {
    pub fn new(
        player_id: impl Into<PlayerId>,
        score_change: i32,
        mmr_change: Rating,
        info: impl Into<String>,
        season: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id: player_id.into(),
            score_change,
            mmr_change,
            match_id: None,
            info: info.into(),
            season,
            created_at: Utc::now(),
        }
    }

    pub fn with_match(mut self, match_id: MatchId) -> Self {
        self.match_id = Some(match_id);
        self
    }
}

/// Values of the ladder at the moment a match is scored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    pub match_id: MatchId,
    pub season: u32,
    pub mmr_per_game: Rating,
}

/// Computes per-player score changes for a match
#[derive(Debug, Clone)]
pub struct RatingUpdater {
    config: RatingConfig,
}

impl RatingUpdater {
    pub fn new(config: RatingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// `min(cap, floor(|diff| / step) * unit)`
    pub fn underdog_bonus(&self, mmr_diff: f64) -> Rating {
        if self.config.underdog_step <= 0 {
            return 0;
        }
        let steps = (mmr_diff.abs() / self.config.underdog_step as f64).floor() as Rating;
        (steps * self.config.underdog_unit).min(self.config.underdog_cap)
    }

    /// Reduce `delta` so the player's rating stays inside their band.
    ///
    /// The delta is only ever shrunk towards zero, so a player already
    /// outside the band is not pulled across it by a single match.
    fn clamp_delta(&self, player: &Player, delta: Rating) -> Rating {
        if !self.config.clamp_to_boundaries {
            return delta;
        }
        let Some((min, max)) = player.rating_bounds() else {
            return delta;
        };

        let current = player.ladder_mmr;
        if delta > 0 && current + delta > max {
            (max - current).max(0)
        } else if delta < 0 && current + delta < min {
            (min - current).min(0)
        } else {
            delta
        }
    }

    /// One score change per player of `split`, `winner` being a team index
    pub fn score_changes(
        &self,
        split: &TeamSplit,
        winner: usize,
        players: &HashMap<PlayerId, Player>,
        context: &ScoringContext,
    ) -> Result<Vec<ScoreChange>, LadderError> {
        if winner > 1 {
            return Err(LadderError::MatchRecordingRefused {
                reason: format!("invalid winning team {}", winner),
            });
        }

        let underdog = split.underdog();
        let bonus = self.underdog_bonus(split.mmr_diff);
        let mut changes = Vec::with_capacity(split.player_count());

        for (team_idx, team) in split.teams.iter().enumerate() {
            let victory = if team_idx == winner { 1 } else { -1 };
            let underdog_sign = match underdog {
                Some(idx) if idx == team_idx => 1,
                Some(_) => -1,
                None => 0,
            };

            for member in &team.players {
                let player =
                    players
                        .get(&member.id)
                        .ok_or_else(|| LadderError::PlayerNotFound {
                            player: member.id.clone(),
                        })?;

                let delta = context.mmr_per_game * victory + bonus * underdog_sign;
                let delta = self.clamp_delta(player, delta);

                changes.push(
                    ScoreChange::new(
                        player.id.clone(),
                        victory,
                        delta,
                        if victory > 0 { "Victory" } else { "Defeat" },
                        context.season,
                    )
                    .with_match(context.match_id),
                );
            }
        }

        Ok(changes)
    }
}

impl Default for RatingUpdater {
    fn default() -> Self {
        Self::new(RatingConfig::with_clamping(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{balance_from_teams, BalancePlayer};
    use crate::config::BalancerConfig;
    use crate::types::RoleScores;
    use proptest::prelude::*;

    fn player(id: &str, rating: Rating) -> Player {
        Player {
            id: id.to_string(),
            name: id.to_string(),
            account_id: None,
            discord_id: None,
            dota_mmr: rating,
            ladder_mmr: rating,
            score: 25,
            rank_ladder_mmr: 0,
            rank_score: 0,
            roles: RoleScores::default(),
            banned: None,
            vouched: true,
            voice_issues: false,
            bot_access: false,
            min_allowed_mmr: 0,
            max_allowed_mmr: 0,
            created_at: Utc::now(),
        }
    }

    fn fixture(team_a: &[Rating], team_b: &[Rating]) -> (TeamSplit, HashMap<PlayerId, Player>) {
        let mut players = HashMap::new();
        let mut build = |prefix: &str, ratings: &[Rating]| -> Vec<BalancePlayer> {
            ratings
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let p = player(&format!("{}{}", prefix, i), *r);
                    let bp = BalancePlayer::from(&p);
                    players.insert(p.id.clone(), p);
                    bp
                })
                .collect()
        };
        let a = build("a", team_a);
        let b = build("b", team_b);
        let split = balance_from_teams(a, b, &BalancerConfig::default()).unwrap();
        (split, players)
    }

    fn context() -> ScoringContext {
        ScoringContext {
            match_id: Uuid::new_v4(),
            season: 1,
            mmr_per_game: 50,
        }
    }

    fn delta_of(changes: &[ScoreChange], id: &str) -> Rating {
        changes
            .iter()
            .find(|c| c.player_id == id)
            .map(|c| c.mmr_change)
            .unwrap()
    }

    #[test]
    fn test_underdog_bonus_steps_and_cap() {
        let updater = RatingUpdater::default();
        assert_eq!(updater.underdog_bonus(0.0), 0);
        assert_eq!(updater.underdog_bonus(299.9), 0);
        assert_eq!(updater.underdog_bonus(-300.0), 15);
        assert_eq!(updater.underdog_bonus(1000.0), 15);
    }

    #[test]
    fn test_even_match_moves_exactly_mmr_per_game() {
        let (split, players) = fixture(&[3000; 5], &[3000; 5]);
        let changes = RatingUpdater::default()
            .score_changes(&split, 0, &players, &context())
            .unwrap();

        assert_eq!(changes.len(), 10);
        for change in &changes {
            let expected = if change.player_id.starts_with('a') { 50 } else { -50 };
            assert_eq!(change.mmr_change, expected);
            assert_eq!(change.score_change, expected.signum());
        }
    }

    #[test]
    fn test_underdog_bonus_applies_both_ways() {
        // Team b averages 400 less, so it is the underdog with a 15 bonus
        let (split, players) = fixture(&[3400; 5], &[3000; 5]);
        let updater = RatingUpdater::default();

        let upset = updater
            .score_changes(&split, 1, &players, &context())
            .unwrap();
        assert_eq!(delta_of(&upset, "b0"), 65);
        assert_eq!(delta_of(&upset, "a0"), -65);

        let expected = updater
            .score_changes(&split, 0, &players, &context())
            .unwrap();
        assert_eq!(delta_of(&expected, "a0"), 35);
        assert_eq!(delta_of(&expected, "b0"), -35);
    }

    #[test]
    fn test_clamping_reduces_delta() {
        let (split, mut players) = fixture(&[3000; 5], &[3000; 5]);
        if let Some(p) = players.get_mut("a0") {
            p.min_allowed_mmr = 2980;
            p.max_allowed_mmr = 3020;
        }
        if let Some(p) = players.get_mut("b0") {
            p.min_allowed_mmr = 2990;
            p.max_allowed_mmr = 3010;
        }

        let clamped = RatingUpdater::new(RatingConfig::with_clamping(true));
        let changes = clamped
            .score_changes(&split, 0, &players, &context())
            .unwrap();
        assert_eq!(delta_of(&changes, "a0"), 20);
        assert_eq!(delta_of(&changes, "b0"), -10);
        assert_eq!(delta_of(&changes, "a1"), 50);

        let unclamped = RatingUpdater::default()
            .score_changes(&split, 0, &players, &context())
            .unwrap();
        assert_eq!(delta_of(&unclamped, "a0"), 50);
    }

    #[test]
    fn test_rejects_unknown_player_and_winner() {
        let (split, mut players) = fixture(&[3000; 5], &[3000; 5]);
        let updater = RatingUpdater::default();
        assert!(updater.score_changes(&split, 2, &players, &context()).is_err());

        players.remove("b3");
        let result = updater.score_changes(&split, 0, &players, &context());
        assert_eq!(
            result,
            Err(LadderError::PlayerNotFound {
                player: "b3".to_string()
            })
        );
    }

    proptest! {
        #[test]
        fn prop_unclamped_match_is_zero_sum(
            team_a in proptest::collection::vec(1000i32..9000, 5),
            team_b in proptest::collection::vec(1000i32..9000, 5),
            winner in 0usize..2,
        ) {
            let (split, players) = fixture(&team_a, &team_b);
            let updater = RatingUpdater::default();
            let changes = updater.score_changes(&split, winner, &players, &context()).unwrap();

            let total: Rating = changes.iter().map(|c| c.mmr_change).sum();
            prop_assert_eq!(total, 0);

            let again = updater.score_changes(&split, winner, &players, &context()).unwrap();
            let deltas: Vec<Rating> = changes.iter().map(|c| c.mmr_change).collect();
            let repeat: Vec<Rating> = again.iter().map(|c| c.mmr_change).collect();
            prop_assert_eq!(deltas, repeat);
        }
    }
}
