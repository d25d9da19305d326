//! Exhaustive split search
//!
//! Enumerates every way to divide a roster of `2k` players into two teams of
//! `k`, drops degenerate splits, optionally searches role assignments, and
//! ranks what remains.

use crate::balancer::roles::assign_roles;
use crate::balancer::team::{sort_by_rating, BalancePlayer, Team, TeamSplit};
use crate::config::BalancerConfig;
use crate::error::LadderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// All admissible splits for one roster, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub mmr_exponent: f64,
    pub role_balanced: bool,
    pub answers: Vec<TeamSplit>,
}

impl BalanceResult {
    pub fn best(&self) -> Option<&TeamSplit> {
        self.answers.first()
    }

    /// The `index`-th best candidate (0-based)
    pub fn candidate(&self, index: usize) -> Result<&TeamSplit, LadderError> {
        self.answers.get(index).ok_or(LadderError::InvalidCandidate {
            index,
            available: self.answers.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

/// Lexicographic k-subsets of `0..n`
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if k > n {
        return result;
    }

    let mut current: Vec<usize> = (0..k).collect();
    loop {
        result.push(current.clone());

        // Find the rightmost index that can still be advanced
        let mut i = k;
        while i > 0 && current[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            return result;
        }

        current[i - 1] += 1;
        for j in i..k {
            current[j] = current[j - 1] + 1;
        }
    }
}

/// Team balancer
#[derive(Debug, Clone)]
pub struct Balancer {
    config: BalancerConfig,
}

impl Balancer {
    pub fn new(config: BalancerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Balance a roster with sides randomised by the thread RNG
    pub fn balance(&self, roster: Vec<BalancePlayer>) -> Result<BalanceResult, LadderError> {
        self.balance_with_rng(roster, &mut rand::thread_rng())
    }

    /// Balance a roster, drawing side labels from `rng`
    pub fn balance_with_rng<R: Rng + ?Sized>(
        &self,
        roster: Vec<BalancePlayer>,
        rng: &mut R,
    ) -> Result<BalanceResult, LadderError> {
        let mut answers = self.ranked_splits(roster)?;

        // Which team is called "team 1" carries no meaning
        for split in answers.iter_mut() {
            if rng.gen_bool(0.5) {
                split.swap_sides();
            }
        }

        Ok(BalanceResult {
            mmr_exponent: self.config.mmr_exponent,
            role_balanced: self.config.role_balancing,
            answers,
        })
    }

    /// Score two fixed teams with the configured exponent
    pub fn balance_from_teams(
        &self,
        team_a: Vec<BalancePlayer>,
        team_b: Vec<BalancePlayer>,
    ) -> Result<TeamSplit, LadderError> {
        super::team::balance_from_teams(team_a, team_b, &self.config)
    }

    fn validate(&self, roster: &[BalancePlayer]) -> Result<(), LadderError> {
        let expected = self.config.roster_size();
        if roster.len() != expected {
            return Err(LadderError::InvalidRosterSize {
                expected,
                actual: roster.len(),
            });
        }

        let mut seen = HashSet::new();
        for player in roster {
            if !seen.insert(player.id.as_str()) {
                return Err(LadderError::DuplicatePlayer {
                    player_id: player.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every admissible split, sorted, with team 1 holding the top player
    fn ranked_splits(&self, mut roster: Vec<BalancePlayer>) -> Result<Vec<TeamSplit>, LadderError> {
        self.validate(&roster)?;
        sort_by_rating(&mut roster);

        let n = roster.len();
        let k = self.config.team_size;
        let subsets = combinations(n, k);
        let half = subsets.len() / 2;

        let top_pair = [0, 1];
        let bottom_pair = [n - 2, n - 1];
        let use_roles = self.config.role_balancing;

        let mut answers = Vec::new();
        for subset in &subsets[..half] {
            let picked = |pair: &[usize; 2]| pair.iter().filter(|i| subset.contains(*i)).count();
            if picked(&top_pair) != 1 || picked(&bottom_pair) != 1 {
                continue;
            }

            let (first, second): (Vec<usize>, Vec<usize>) =
                (0..n).partition(|i| subset.contains(i));
            let pick = |indices: Vec<usize>| -> Vec<BalancePlayer> {
                indices.into_iter().map(|i| roster[i].clone()).collect()
            };

            let mut team_a = Team::new(pick(first), self.config.mmr_exponent);
            let mut team_b = Team::new(pick(second), self.config.mmr_exponent);

            if use_roles {
                assign_roles(&mut team_a, self.config.core_role_max_gap);
                assign_roles(&mut team_b, self.config.core_role_max_gap);
            }

            let split = TeamSplit::from_teams(team_a, team_b);
            if use_roles && split.mmr_diff > self.config.role_mmr_ceiling {
                continue;
            }
            answers.push(split);
        }

        if use_roles {
            answers.sort_by(|a, b| {
                b.role_score
                    .cmp(&a.role_score)
                    .then(a.mmr_diff_exp.total_cmp(&b.mmr_diff_exp))
            });
        } else {
            answers.sort_by(|a, b| a.mmr_diff_exp.total_cmp(&b.mmr_diff_exp));
        }

        debug!(
            "Balanced roster of {} - {} of {} pairings admissible, role balancing: {}",
            n,
            answers.len(),
            half,
            use_roles
        );

        Ok(answers)
    }
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new(BalancerConfig::default())
    }
}
