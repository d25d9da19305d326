//! Team splits and their fairness metrics
//!
//! A `TeamSplit` is one partition of a roster into two teams; its statistics
//! are computed by `TeamStats` both for searched candidates and for teams
//! composed by hand, so scoring the same teams twice yields identical values.

use crate::config::BalancerConfig;
use crate::error::LadderError;
use crate::types::{Player, PlayerId, Rating, Role, RoleScores};
use crate::utils::{rating_difference, rating_power};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The part of a player the balancer looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancePlayer {
    pub id: PlayerId,
    pub name: String,
    pub rating: Rating,
    pub roles: RoleScores,
}

impl BalancePlayer {
    pub fn new(id: impl Into<PlayerId>, rating: Rating) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            rating,
            roles: RoleScores::default(),
        }
    }

    pub fn with_roles(mut self, roles: RoleScores) -> Self {
        self.roles = roles;
        self
    }
}

impl From<&Player> for BalancePlayer {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            rating: player.ladder_mmr,
            roles: player.roles,
        }
    }
}

/// Sort players by descending rating, keeping input order among equals
pub(crate) fn sort_by_rating(players: &mut [BalancePlayer]) {
    players.sort_by(|a, b| b.rating.cmp(&a.rating));
}

/// Average and exponent-weighted average rating of one team
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamStats {
    pub mmr: f64,
    pub mmr_exp: f64,
}

impl TeamStats {
    pub fn compute(players: &[BalancePlayer], exponent: f64) -> Self {
        if players.is_empty() {
            return Self {
                mmr: 0.0,
                mmr_exp: 0.0,
            };
        }

        let count = players.len() as f64;
        let sum: f64 = players.iter().map(|p| p.rating as f64).sum();
        let sum_exp: f64 = players
            .iter()
            .map(|p| rating_power(p.rating, exponent))
            .sum();

        Self {
            mmr: sum / count,
            mmr_exp: sum_exp / count,
        }
    }
}

/// One side of a split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Players, highest rated first
    pub players: Vec<BalancePlayer>,
    pub mmr: f64,
    pub mmr_exp: f64,
    /// `roles[i]` is the role of `players[i]` when role balancing ran
    pub roles: Option<Vec<Role>>,
    pub role_score: u32,
}

impl Team {
    pub(crate) fn new(mut players: Vec<BalancePlayer>, exponent: f64) -> Self {
        sort_by_rating(&mut players);
        let stats = TeamStats::compute(&players, exponent);
        Self {
            players,
            mmr: stats.mmr,
            mmr_exp: stats.mmr_exp,
            roles: None,
            role_score: 0,
        }
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    pub fn player_ids(&self) -> HashSet<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn top_rating(&self) -> Option<Rating> {
        self.players.iter().map(|p| p.rating).max()
    }

    /// Role of a player, if roles were assigned
    pub fn role_of(&self, player_id: &str) -> Option<Role> {
        let roles = self.roles.as_ref()?;
        self.players
            .iter()
            .position(|p| p.id == player_id)
            .and_then(|idx| roles.get(idx).copied())
    }
}

/// One candidate partition of a roster into two teams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSplit {
    pub teams: [Team; 2],
    /// Absolute difference of the team averages
    pub mmr_diff: f64,
    /// Absolute difference of the exponent-weighted averages
    pub mmr_diff_exp: f64,
    /// Sum of both teams' role scores (0 without role balancing)
    pub role_score: u32,
}

impl TeamSplit {
    pub(crate) fn from_teams(first: Team, second: Team) -> Self {
        let mmr_diff = rating_difference(first.mmr, second.mmr);
        let mmr_diff_exp = rating_difference(first.mmr_exp, second.mmr_exp);
        let role_score = first.role_score + second.role_score;
        Self {
            teams: [first, second],
            mmr_diff,
            mmr_diff_exp,
            role_score,
        }
    }

    /// Signed difference `teams[0].mmr - teams[1].mmr`
    pub fn signed_mmr_diff(&self) -> f64 {
        self.teams[0].mmr - self.teams[1].mmr
    }

    /// Index of the lower rated team, `None` when averages are equal
    pub fn underdog(&self) -> Option<usize> {
        let diff = self.signed_mmr_diff();
        if diff < 0.0 {
            Some(0)
        } else if diff > 0.0 {
            Some(1)
        } else {
            None
        }
    }

    /// Exchange the two teams; statistics are symmetric and stay valid
    pub fn swap_sides(&mut self) {
        self.teams.swap(0, 1);
    }

    /// Team index of a player
    pub fn team_of(&self, player_id: &str) -> Option<usize> {
        self.teams.iter().position(|team| team.contains(player_id))
    }

    pub fn players(&self) -> impl Iterator<Item = &BalancePlayer> {
        self.teams.iter().flat_map(|team| team.players.iter())
    }

    pub fn player_count(&self) -> usize {
        self.teams.iter().map(|team| team.players.len()).sum()
    }

    /// Move `first` and `second` to each other's team and rescore.
    ///
    /// Role assignments are dropped because they no longer describe the teams.
    pub fn swap_players(
        &self,
        first: &str,
        second: &str,
        config: &BalancerConfig,
    ) -> Result<TeamSplit, LadderError> {
        let first_team = self.team_of(first).ok_or_else(|| LadderError::PlayerNotFound {
            player: first.to_string(),
        })?;
        let second_team = self
            .team_of(second)
            .ok_or_else(|| LadderError::PlayerNotFound {
                player: second.to_string(),
            })?;

        if first_team == second_team {
            return Err(LadderError::Internal {
                message: format!("{} and {} are on the same team", first, second),
            });
        }

        let mut teams: [Vec<BalancePlayer>; 2] = [
            self.teams[0].players.clone(),
            self.teams[1].players.clone(),
        ];
        let take = |team: &mut Vec<BalancePlayer>, id: &str| {
            team.iter()
                .position(|p| p.id == id)
                .map(|idx| team.remove(idx))
        };

        let moved_first = take(&mut teams[first_team], first);
        let moved_second = take(&mut teams[second_team], second);
        if let (Some(a), Some(b)) = (moved_first, moved_second) {
            teams[second_team].push(a);
            teams[first_team].push(b);
        }

        let [team_a, team_b] = teams;
        balance_from_teams(team_a, team_b, config)
    }
}

/// Score two already formed teams without searching.
///
/// Used for drafted teams, teams observed in a live lobby and manual swaps.
pub fn balance_from_teams(
    team_a: Vec<BalancePlayer>,
    team_b: Vec<BalancePlayer>,
    config: &BalancerConfig,
) -> Result<TeamSplit, LadderError> {
    for team in [&team_a, &team_b] {
        if team.len() != config.team_size {
            return Err(LadderError::InvalidRosterSize {
                expected: config.roster_size(),
                actual: team_a.len() + team_b.len(),
            });
        }
    }

    let mut seen = HashSet::new();
    for player in team_a.iter().chain(team_b.iter()) {
        if !seen.insert(player.id.as_str()) {
            return Err(LadderError::DuplicatePlayer {
                player_id: player.id.clone(),
            });
        }
    }

    let first = Team::new(team_a, config.mmr_exponent);
    let second = Team::new(team_b, config.mmr_exponent);
    Ok(TeamSplit::from_teams(first, second))
}
