//! Match recording
//!
//! Turns an observed game result into a `Match` plus its score changes and
//! writes both through the ladder store in one step.

use crate::balancer::TeamSplit;
use crate::error::{LadderError, Result};
use crate::rating::calculator::{RatingUpdater, ScoreChange, ScoringContext};
use crate::rating::storage::LadderStore;
use crate::types::{MatchId, PlayerId};
use crate::utils::{current_timestamp, generate_match_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPlayer {
    pub player_id: PlayerId,
    pub team: usize,
}

/// A finished and scored game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    /// The split that was played, team 0 is radiant
    pub split: TeamSplit,
    pub winner: usize,
    pub season: u32,
    /// Game id reported by the lobby driver
    pub external_id: Option<u64>,
    pub players: Vec<MatchPlayer>,
    pub created_at: DateTime<Utc>,
}

/// Records match results and their rating changes
pub struct MatchRecorder {
    store: Arc<dyn LadderStore>,
    updater: RatingUpdater,
    team_size: usize,
}

impl MatchRecorder {
    pub fn new(store: Arc<dyn LadderStore>, updater: RatingUpdater, team_size: usize) -> Self {
        Self {
            store,
            updater,
            team_size,
        }
    }

    fn refuse(reason: impl Into<String>) -> anyhow::Error {
        LadderError::MatchRecordingRefused {
            reason: reason.into(),
        }
        .into()
    }

    /// Record `split` as played with `winner` (team index) and score it.
    ///
    /// Nothing is written when the split does not hold exactly `2k` distinct
    /// registered players across two teams of `k`.
    pub fn record(
        &self,
        split: &TeamSplit,
        winner: usize,
        external_id: Option<u64>,
    ) -> Result<(Match, Vec<ScoreChange>)> {
        if split.teams.iter().any(|t| t.players.len() != self.team_size) {
            warn!(
                "Refusing to record match with team sizes {} and {}",
                split.teams[0].players.len(),
                split.teams[1].players.len()
            );
            return Err(Self::refuse(format!(
                "teams must have {} players each",
                self.team_size
            )));
        }

        let ids: Vec<PlayerId> = split.players().map(|p| p.id.clone()).collect();
        let distinct: HashSet<&PlayerId> = ids.iter().collect();
        if distinct.len() != ids.len() {
            return Err(Self::refuse("a player appears twice"));
        }

        let mut players = HashMap::with_capacity(ids.len());
        for id in &ids {
            match self.store.get_player(id)? {
                Some(player) => {
                    players.insert(id.clone(), player);
                }
                None => {
                    warn!("Refusing to record match, unknown player {}", id);
                    return Err(Self::refuse(format!("player {} is not registered", id)));
                }
            }
        }

        let settings = self.store.settings()?;
        let context = ScoringContext {
            match_id: generate_match_id(),
            season: settings.current_season,
            mmr_per_game: settings.mmr_per_game,
        };
        let changes = self
            .updater
            .score_changes(split, winner, &players, &context)?;

        let record = Match {
            id: context.match_id,
            split: split.clone(),
            winner,
            season: context.season,
            external_id,
            players: split
                .teams
                .iter()
                .enumerate()
                .flat_map(|(team, t)| {
                    t.players.iter().map(move |p| MatchPlayer {
                        player_id: p.id.clone(),
                        team,
                    })
                })
                .collect(),
            created_at: current_timestamp(),
        };

        self.store.record_match(record.clone(), changes.clone())?;
        self.store.update_ranks()?;

        info!(
            "Recorded match {} (season {}), team {} won, underdog bonus {}",
            record.id,
            record.season,
            winner,
            self.updater.underdog_bonus(split.mmr_diff)
        );

        Ok((record, changes))
    }
}
