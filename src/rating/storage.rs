//! Ladder storage interface and in-memory implementation
//!
//! The store owns players, the score change ledger, matches, queue channels
//! and queues. A player's cached `ladder_mmr` and `score` always equal the
//! sum of their score changes in the current season.

use crate::balancer::TeamSplit;
use crate::config::RatingConfig;
use crate::error::{LadderError, Result};
use crate::queue::model::{LadderQueue, QueueChannel, QueueMember};
use crate::rating::calculator::ScoreChange;
use crate::rating::recorder::Match;
use crate::types::{AccountId, ChannelId, MatchId, NewPlayer, Player, PlayerId, QueueId, Rating};
use crate::utils::{current_timestamp, generate_player_id};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Ladder wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderSettings {
    pub current_season: u32,
    pub mmr_per_game: Rating,
    pub initial_score: i32,
}

impl From<&RatingConfig> for LadderSettings {
    fn from(config: &RatingConfig) -> Self {
        Self {
            current_season: 1,
            mmr_per_game: config.mmr_per_game,
            initial_score: config.initial_score,
        }
    }
}

/// Trait for ladder storage operations
pub trait LadderStore: Send + Sync {
    /// Register a player and grant the season's starting score
    fn register_player(&self, new_player: NewPlayer) -> Result<Player>;

    fn get_player(&self, player_id: &str) -> Result<Option<Player>>;

    fn find_by_account(&self, account_id: AccountId) -> Result<Option<Player>>;

    /// Case-insensitive lookup: exact name, then prefix, then substring
    fn find_by_name(&self, name: &str) -> Result<Option<Player>>;

    /// Replace a player's flags and profile; cached rating fields are kept
    fn update_player(&self, player: Player) -> Result<()>;

    fn list_players(&self) -> Result<Vec<Player>>;

    fn create_channel(&self, channel: QueueChannel) -> Result<QueueChannel>;

    fn get_channel(&self, channel_id: ChannelId) -> Result<Option<QueueChannel>>;

    fn list_channels(&self) -> Result<Vec<QueueChannel>>;

    /// Refused while the channel has an active queue
    fn set_channel_min_rating(&self, channel_id: ChannelId, min_rating: Rating) -> Result<()>;

    fn create_queue(&self, channel_id: ChannelId, capacity: usize) -> Result<LadderQueue>;

    fn get_queue(&self, queue_id: QueueId) -> Result<Option<LadderQueue>>;

    /// Active queues, oldest first
    fn active_queues(&self) -> Result<Vec<LadderQueue>>;

    fn active_queue_for_player(&self, player_id: &str) -> Result<Option<LadderQueue>>;

    fn add_queue_player(&self, queue_id: QueueId, player_id: &str) -> Result<LadderQueue>;

    /// Add a player to the oldest open queue of the channel, creating one
    /// with `capacity` seats when none has room. With `rating` set, queues
    /// whose filter refuses that rating are skipped. Finding the queue and
    /// taking the seat happen atomically.
    fn join_open_queue(
        &self,
        channel_id: ChannelId,
        player_id: &str,
        capacity: usize,
        rating: Option<Rating>,
    ) -> Result<LadderQueue>;

    /// Remove a member; an emptied queue that never started is closed
    fn remove_queue_player(&self, queue_id: QueueId, player_id: &str) -> Result<LadderQueue>;

    fn set_queue_balance(&self, queue_id: QueueId, split: Option<TeamSplit>) -> Result<()>;

    fn mark_queue_started(&self, queue_id: QueueId) -> Result<()>;

    fn close_queue(&self, queue_id: QueueId) -> Result<()>;

    /// Append to the ledger and return the player with recomputed totals
    fn add_score_change(&self, change: ScoreChange) -> Result<Player>;

    fn score_changes(&self, player_id: &str) -> Result<Vec<ScoreChange>>;

    /// Write a match and all its score changes, or nothing
    fn record_match(&self, record: Match, changes: Vec<ScoreChange>) -> Result<()>;

    fn get_match(&self, match_id: MatchId) -> Result<Option<Match>>;

    fn list_matches(&self) -> Result<Vec<Match>>;

    fn settings(&self) -> Result<LadderSettings>;

    /// Start the next season, reseeding every player; returns the new season
    fn start_new_season(&self) -> Result<u32>;

    /// Recompute rating and score ranks of all players
    fn update_ranks(&self) -> Result<()>;

    /// Bound every player to `reference ± width`, correcting anyone outside.
    /// Returns the number of corrected players.
    fn apply_rating_boundaries(&self, width: Rating) -> Result<usize>;
}

#[derive(Debug, Default)]
struct LadderData {
    players: HashMap<PlayerId, Player>,
    ledger: Vec<ScoreChange>,
    matches: Vec<Match>,
    channels: HashMap<ChannelId, QueueChannel>,
    queues: HashMap<QueueId, LadderQueue>,
}

impl LadderData {
    /// Cache the season's ledger sums on the player. Totals below zero are
    /// lifted by a corrective entry so the cache always equals the sum.
    fn recompute(&mut self, player_id: &str, season: u32) {
        let (mmr, score) = self
            .ledger
            .iter()
            .filter(|c| c.player_id == player_id && c.season == season)
            .fold((0, 0), |(mmr, score), c| {
                (mmr + c.mmr_change, score + c.score_change)
            });

        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        if mmr < 0 || score < 0 {
            let correction = ScoreChange::new(
                player_id.to_string(),
                -score.min(0),
                -mmr.min(0),
                "Floor at zero",
                season,
            );
            debug!(
                "{} fell below zero, correcting by {} rating and {} score",
                player.name, correction.mmr_change, correction.score_change
            );
            self.ledger.push(correction);
        }
        player.ladder_mmr = mmr.max(0);
        player.score = score.max(0);
    }

    fn queue_mut(&mut self, queue_id: QueueId) -> std::result::Result<&mut LadderQueue, LadderError> {
        self.queues
            .get_mut(&queue_id)
            .ok_or_else(|| LadderError::QueueNotFound {
                queue_id: queue_id.to_string(),
            })
    }

    fn seat_player(
        &mut self,
        queue_id: QueueId,
        player_id: &str,
    ) -> std::result::Result<LadderQueue, LadderError> {
        if !self.players.contains_key(player_id) {
            return Err(LadderError::PlayerNotFound {
                player: player_id.to_string(),
            });
        }
        if self
            .queues
            .values()
            .any(|q| q.active && q.contains(player_id))
        {
            return Err(LadderError::AlreadyQueued {
                player: player_id.to_string(),
            });
        }

        let queue = self.queue_mut(queue_id)?;
        if !queue.active || queue.is_full() {
            return Err(LadderError::QueueFull {
                queue_id: queue_id.to_string(),
            });
        }
        queue.members.push(QueueMember {
            player_id: player_id.to_string(),
            joined_at: current_timestamp(),
        });
        Ok(queue.clone())
    }

    fn has_active_queue(&self, channel_id: ChannelId) -> bool {
        self.queues
            .values()
            .any(|q| q.channel_id == channel_id && q.active)
    }
}

/// Assign ranks by descending value; tied players share the lowest rank of
/// their group, counted as the number of players at or above them
fn rank_by<F, S>(players: &mut HashMap<PlayerId, Player>, value: F, mut set: S)
where
    F: Fn(&Player) -> i32,
    S: FnMut(&mut Player, u32),
{
    let mut groups: BTreeMap<i32, Vec<PlayerId>> = BTreeMap::new();
    for player in players.values() {
        groups.entry(value(player)).or_default().push(player.id.clone());
    }

    let mut rank = 0u32;
    for ids in groups.values().rev() {
        rank += ids.len() as u32;
        for id in ids {
            if let Some(player) = players.get_mut(id) {
                set(player, rank);
            }
        }
    }
}

/// In-memory ladder store
#[derive(Debug)]
pub struct InMemoryLadderStore {
    data: RwLock<LadderData>,
    settings: RwLock<LadderSettings>,
}

impl InMemoryLadderStore {
    pub fn new(settings: LadderSettings) -> Self {
        Self {
            data: RwLock::new(LadderData::default()),
            settings: RwLock::new(settings),
        }
    }

    fn read(&self) -> std::result::Result<RwLockReadGuard<'_, LadderData>, LadderError> {
        self.data.read().map_err(|_| LadderError::lock("ladder data read"))
    }

    fn write(&self) -> std::result::Result<RwLockWriteGuard<'_, LadderData>, LadderError> {
        self.data
            .write()
            .map_err(|_| LadderError::lock("ladder data write"))
    }

    fn current_settings(&self) -> std::result::Result<LadderSettings, LadderError> {
        self.settings
            .read()
            .map(|s| s.clone())
            .map_err(|_| LadderError::lock("ladder settings read"))
    }
}

impl Default for InMemoryLadderStore {
    fn default() -> Self {
        Self::new(LadderSettings::from(&RatingConfig::with_clamping(false)))
    }
}

impl LadderStore for InMemoryLadderStore {
    fn register_player(&self, new_player: NewPlayer) -> Result<Player> {
        let settings = self.current_settings()?;
        let mut data = self.write()?;

        let lowered = new_player.name.to_lowercase();
        if data.players.values().any(|p| p.name.to_lowercase() == lowered) {
            return Err(LadderError::AlreadyRegistered {
                reason: format!("name {} is taken", new_player.name),
            }
            .into());
        }
        if let Some(account_id) = new_player.account_id {
            if data
                .players
                .values()
                .any(|p| p.account_id == Some(account_id))
            {
                return Err(LadderError::AlreadyRegistered {
                    reason: format!("account {} is linked to another player", account_id),
                }
                .into());
            }
        }

        let player = Player {
            id: generate_player_id(),
            name: new_player.name,
            account_id: new_player.account_id,
            discord_id: new_player.discord_id,
            dota_mmr: new_player.dota_mmr,
            ladder_mmr: 0,
            score: 0,
            rank_ladder_mmr: 0,
            rank_score: 0,
            roles: new_player.roles,
            banned: None,
            vouched: false,
            voice_issues: false,
            bot_access: false,
            min_allowed_mmr: 0,
            max_allowed_mmr: 0,
            created_at: current_timestamp(),
        };
        let id = player.id.clone();

        data.ledger.push(ScoreChange::new(
            id.clone(),
            settings.initial_score,
            player.dota_mmr,
            "Season started",
            settings.current_season,
        ));
        data.players.insert(id.clone(), player);
        data.recompute(&id, settings.current_season);

        let player = data
            .players
            .get(&id)
            .cloned()
            .ok_or_else(|| LadderError::PlayerNotFound { player: id.clone() })?;
        info!(
            "Registered player {} ({}) with rating {}",
            player.name, player.id, player.ladder_mmr
        );
        Ok(player)
    }

    fn get_player(&self, player_id: &str) -> Result<Option<Player>> {
        Ok(self.read()?.players.get(player_id).cloned())
    }

    fn find_by_account(&self, account_id: AccountId) -> Result<Option<Player>> {
        Ok(self
            .read()?
            .players
            .values()
            .find(|p| p.account_id == Some(account_id))
            .cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Player>> {
        let data = self.read()?;
        let needle = name.to_lowercase();

        let mut players: Vec<&Player> = data.players.values().collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));

        let tiers: [&dyn Fn(&str) -> bool; 3] = [
            &|candidate: &str| candidate == needle,
            &|candidate: &str| candidate.starts_with(needle.as_str()),
            &|candidate: &str| candidate.contains(needle.as_str()),
        ];
        for tier in tiers {
            if let Some(found) = players
                .iter()
                .find(|p| tier(p.name.to_lowercase().as_str()))
            {
                return Ok(Some((*found).clone()));
            }
        }
        Ok(None)
    }

    fn update_player(&self, player: Player) -> Result<()> {
        let mut data = self.write()?;
        let existing = data
            .players
            .get_mut(&player.id)
            .ok_or_else(|| LadderError::PlayerNotFound {
                player: player.id.clone(),
            })?;

        let (ladder_mmr, score) = (existing.ladder_mmr, existing.score);
        let (rank_ladder_mmr, rank_score) = (existing.rank_ladder_mmr, existing.rank_score);
        *existing = Player {
            ladder_mmr,
            score,
            rank_ladder_mmr,
            rank_score,
            ..player
        };
        Ok(())
    }

    fn list_players(&self) -> Result<Vec<Player>> {
        let mut players: Vec<Player> = self.read()?.players.values().cloned().collect();
        players.sort_by(|a, b| b.ladder_mmr.cmp(&a.ladder_mmr).then(a.name.cmp(&b.name)));
        Ok(players)
    }

    fn create_channel(&self, channel: QueueChannel) -> Result<QueueChannel> {
        let mut data = self.write()?;
        data.channels.insert(channel.id, channel.clone());
        debug!("Created queue channel {} ({})", channel.name, channel.id);
        Ok(channel)
    }

    fn get_channel(&self, channel_id: ChannelId) -> Result<Option<QueueChannel>> {
        Ok(self.read()?.channels.get(&channel_id).cloned())
    }

    fn list_channels(&self) -> Result<Vec<QueueChannel>> {
        let mut channels: Vec<QueueChannel> = self.read()?.channels.values().cloned().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    fn set_channel_min_rating(&self, channel_id: ChannelId, min_rating: Rating) -> Result<()> {
        let mut data = self.write()?;
        if data.has_active_queue(channel_id) {
            return Err(LadderError::ChannelHasActiveQueue {
                channel_id: channel_id.to_string(),
            }
            .into());
        }
        let channel =
            data.channels
                .get_mut(&channel_id)
                .ok_or_else(|| LadderError::ChannelNotFound {
                    channel_id: channel_id.to_string(),
                })?;
        channel.min_rating = min_rating;
        Ok(())
    }

    fn create_queue(&self, channel_id: ChannelId, capacity: usize) -> Result<LadderQueue> {
        let mut data = self.write()?;
        let channel = data
            .channels
            .get(&channel_id)
            .ok_or_else(|| LadderError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            })?;

        let queue = LadderQueue::new(channel, capacity);
        data.queues.insert(queue.id, queue.clone());
        debug!("Created queue {} in channel {}", queue.id, channel_id);
        Ok(queue)
    }

    fn get_queue(&self, queue_id: QueueId) -> Result<Option<LadderQueue>> {
        Ok(self.read()?.queues.get(&queue_id).cloned())
    }

    fn active_queues(&self) -> Result<Vec<LadderQueue>> {
        let mut queues: Vec<LadderQueue> = self
            .read()?
            .queues
            .values()
            .filter(|q| q.active)
            .cloned()
            .collect();
        queues.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(queues)
    }

    fn active_queue_for_player(&self, player_id: &str) -> Result<Option<LadderQueue>> {
        Ok(self
            .read()?
            .queues
            .values()
            .find(|q| q.active && q.contains(player_id))
            .cloned())
    }

    fn add_queue_player(&self, queue_id: QueueId, player_id: &str) -> Result<LadderQueue> {
        Ok(self.write()?.seat_player(queue_id, player_id)?)
    }

    fn join_open_queue(
        &self,
        channel_id: ChannelId,
        player_id: &str,
        capacity: usize,
        rating: Option<Rating>,
    ) -> Result<LadderQueue> {
        let mut data = self.write()?;
        let channel = data
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| LadderError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            })?;

        let open = data
            .queues
            .values()
            .filter(|q| {
                q.active
                    && q.channel_id == channel_id
                    && !q.is_full()
                    && !q.game_started()
                    && rating.map_or(true, |r| q.admits_rating(r))
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|q| q.id);

        let queue_id = match open {
            Some(queue_id) => queue_id,
            None => {
                let queue = LadderQueue::new(&channel, capacity);
                let queue_id = queue.id;
                data.queues.insert(queue_id, queue);
                debug!("Created queue {} in channel {}", queue_id, channel_id);
                queue_id
            }
        };

        let seated = data.seat_player(queue_id, player_id);
        if seated.is_err() && open.is_none() {
            // Do not leave an empty queue behind for a refused player
            data.queues.remove(&queue_id);
        }
        Ok(seated?)
    }

    fn remove_queue_player(&self, queue_id: QueueId, player_id: &str) -> Result<LadderQueue> {
        let mut data = self.write()?;
        let queue = data.queue_mut(queue_id)?;

        let before = queue.members.len();
        queue.members.retain(|m| m.player_id != player_id);
        if queue.members.len() == before {
            return Err(LadderError::PlayerNotFound {
                player: player_id.to_string(),
            }
            .into());
        }

        // A changed roster invalidates the proposal
        queue.proposed = None;
        if queue.members.is_empty() && !queue.game_started() {
            queue.active = false;
            debug!("Queue {} emptied and closed", queue_id);
        }
        Ok(queue.clone())
    }

    fn set_queue_balance(&self, queue_id: QueueId, split: Option<TeamSplit>) -> Result<()> {
        let mut data = self.write()?;
        data.queue_mut(queue_id)?.proposed = split;
        Ok(())
    }

    fn mark_queue_started(&self, queue_id: QueueId) -> Result<()> {
        let mut data = self.write()?;
        data.queue_mut(queue_id)?.game_started_at = Some(current_timestamp());
        Ok(())
    }

    fn close_queue(&self, queue_id: QueueId) -> Result<()> {
        let mut data = self.write()?;
        data.queue_mut(queue_id)?.active = false;
        info!("Closed queue {}", queue_id);
        Ok(())
    }

    fn add_score_change(&self, change: ScoreChange) -> Result<Player> {
        let season = self.current_settings()?.current_season;
        let mut data = self.write()?;
        if !data.players.contains_key(&change.player_id) {
            return Err(LadderError::PlayerNotFound {
                player: change.player_id,
            }
            .into());
        }

        let player_id = change.player_id.clone();
        data.ledger.push(change);
        data.recompute(&player_id, season);
        data.players
            .get(&player_id)
            .cloned()
            .ok_or_else(|| LadderError::PlayerNotFound { player: player_id }.into())
    }

    fn score_changes(&self, player_id: &str) -> Result<Vec<ScoreChange>> {
        Ok(self
            .read()?
            .ledger
            .iter()
            .filter(|c| c.player_id == player_id)
            .cloned()
            .collect())
    }

    fn record_match(&self, record: Match, changes: Vec<ScoreChange>) -> Result<()> {
        let season = self.current_settings()?.current_season;
        let mut data = self.write()?;

        // Validate everything before touching the ledger
        if let Some(missing) = record
            .players
            .iter()
            .map(|p| &p.player_id)
            .chain(changes.iter().map(|c| &c.player_id))
            .find(|id| !data.players.contains_key(*id))
        {
            return Err(LadderError::MatchRecordingRefused {
                reason: format!("player {} is not registered", missing),
            }
            .into());
        }
        if data.matches.iter().any(|m| m.id == record.id) {
            return Err(LadderError::MatchRecordingRefused {
                reason: format!("match {} already recorded", record.id),
            }
            .into());
        }

        let affected: Vec<PlayerId> = changes.iter().map(|c| c.player_id.clone()).collect();
        data.ledger.extend(changes);
        data.matches.push(record);
        for player_id in &affected {
            data.recompute(player_id, season);
        }
        Ok(())
    }

    fn get_match(&self, match_id: MatchId) -> Result<Option<Match>> {
        Ok(self
            .read()?
            .matches
            .iter()
            .find(|m| m.id == match_id)
            .cloned())
    }

    fn list_matches(&self) -> Result<Vec<Match>> {
        Ok(self.read()?.matches.clone())
    }

    fn settings(&self) -> Result<LadderSettings> {
        Ok(self.current_settings()?)
    }

    fn start_new_season(&self) -> Result<u32> {
        let season = {
            let mut settings = self
                .settings
                .write()
                .map_err(|_| LadderError::lock("ladder settings write"))?;
            settings.current_season += 1;
            settings.clone()
        };

        let mut data = self.write()?;
        let seeds: Vec<(PlayerId, Rating)> = data
            .players
            .values()
            .map(|p| (p.id.clone(), p.dota_mmr))
            .collect();
        for (player_id, dota_mmr) in &seeds {
            data.ledger.push(ScoreChange::new(
                player_id.clone(),
                season.initial_score,
                *dota_mmr,
                "Season started",
                season.current_season,
            ));
            data.recompute(player_id, season.current_season);
        }

        rank_by(&mut data.players, |p| p.ladder_mmr, |p, r| p.rank_ladder_mmr = r);
        rank_by(&mut data.players, |p| p.score, |p, r| p.rank_score = r);

        info!(
            "Started season {} for {} players",
            season.current_season,
            seeds.len()
        );
        Ok(season.current_season)
    }

    fn update_ranks(&self) -> Result<()> {
        let mut data = self.write()?;
        rank_by(&mut data.players, |p| p.ladder_mmr, |p, r| p.rank_ladder_mmr = r);
        rank_by(&mut data.players, |p| p.score, |p, r| p.rank_score = r);
        Ok(())
    }

    fn apply_rating_boundaries(&self, width: Rating) -> Result<usize> {
        let season = self.current_settings()?.current_season;
        let mut data = self.write()?;

        let mut corrections = Vec::new();
        for player in data.players.values_mut() {
            player.min_allowed_mmr = (player.dota_mmr - width).max(0);
            player.max_allowed_mmr = player.dota_mmr + width;

            let bounded = player
                .ladder_mmr
                .clamp(player.min_allowed_mmr, player.max_allowed_mmr);
            if bounded != player.ladder_mmr {
                corrections.push((player.id.clone(), bounded - player.ladder_mmr));
            }
        }

        for (player_id, delta) in &corrections {
            data.ledger.push(ScoreChange::new(
                player_id.clone(),
                0,
                *delta,
                "Rating boundary correction",
                season,
            ));
            data.recompute(player_id, season);
        }

        info!(
            "Applied rating boundaries of {} points, {} players corrected",
            width,
            corrections.len()
        );
        Ok(corrections.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoleScores;

    fn new_player(name: &str, rating: Rating, account: u64) -> NewPlayer {
        NewPlayer {
            name: name.to_string(),
            dota_mmr: rating,
            account_id: Some(account),
            discord_id: None,
            roles: RoleScores::default(),
        }
    }

    #[test]
    fn test_register_seeds_rating_and_score() {
        let store = InMemoryLadderStore::default();
        let player = store.register_player(new_player("Uvs", 5000, 1)).unwrap();

        assert_eq!(player.ladder_mmr, 5000);
        assert_eq!(player.score, 25);
        assert!(!player.vouched);
        assert_eq!(store.score_changes(&player.id).unwrap().len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let store = InMemoryLadderStore::default();
        store.register_player(new_player("Uvs", 5000, 1)).unwrap();

        let same_name = store.register_player(new_player("uvs", 4000, 2));
        assert!(matches!(
            same_name.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::AlreadyRegistered { .. })
        ));
        assert!(store.register_player(new_player("Other", 4000, 1)).is_err());
    }

    #[test]
    fn test_find_by_name_tiers() {
        let store = InMemoryLadderStore::default();
        store.register_player(new_player("Paul", 5000, 1)).unwrap();
        store.register_player(new_player("Paulo", 5000, 2)).unwrap();
        store.register_player(new_player("rawr", 5000, 3)).unwrap();

        assert_eq!(store.find_by_name("PAUL").unwrap().unwrap().name, "Paul");
        assert_eq!(store.find_by_name("paulo").unwrap().unwrap().name, "Paulo");
        assert_eq!(store.find_by_name("ra").unwrap().unwrap().name, "rawr");
        assert_eq!(store.find_by_name("aw").unwrap().unwrap().name, "rawr");
        assert!(store.find_by_name("zzz").unwrap().is_none());
    }

    #[test]
    fn test_score_change_recomputes_and_floors_at_zero() {
        let store = InMemoryLadderStore::default();
        let player = store.register_player(new_player("Mikel", 100, 1)).unwrap();

        let updated = store
            .add_score_change(ScoreChange::new(player.id.clone(), -30, -250, "penalty", 1))
            .unwrap();
        assert_eq!(updated.ladder_mmr, 0);
        assert_eq!(updated.score, 0);

        let updated = store
            .add_score_change(ScoreChange::new(player.id.clone(), 10, 400, "bonus", 1))
            .unwrap();
        assert_eq!(updated.ladder_mmr, 400);
        assert_eq!(updated.score, 10);
    }

    #[test]
    fn test_cached_totals_match_ledger_after_floor() {
        let store = InMemoryLadderStore::default();
        let player = store.register_player(new_player("Ramz", 50, 1)).unwrap();
        store
            .add_score_change(ScoreChange::new(player.id.clone(), -40, -300, "penalty", 1))
            .unwrap();
        let player = store
            .add_score_change(ScoreChange::new(player.id.clone(), -1, -30, "loss", 1))
            .unwrap();

        let changes = store.score_changes(&player.id).unwrap();
        let mmr: Rating = changes.iter().map(|c| c.mmr_change).sum();
        let score: i32 = changes.iter().map(|c| c.score_change).sum();
        assert_eq!(player.ladder_mmr, mmr);
        assert_eq!(player.score, score);
        assert_eq!(
            changes.iter().filter(|c| c.info == "Floor at zero").count(),
            2
        );
    }

    #[test]
    fn test_update_player_keeps_cached_totals() {
        let store = InMemoryLadderStore::default();
        let mut player = store.register_player(new_player("Smile", 4000, 1)).unwrap();
        player.vouched = true;
        player.ladder_mmr = 1;
        store.update_player(player.clone()).unwrap();

        let stored = store.get_player(&player.id).unwrap().unwrap();
        assert!(stored.vouched);
        assert_eq!(stored.ladder_mmr, 4000);
    }

    #[test]
    fn test_ranks_share_ties() {
        let store = InMemoryLadderStore::default();
        store.register_player(new_player("a", 5000, 1)).unwrap();
        store.register_player(new_player("b", 5000, 2)).unwrap();
        store.register_player(new_player("c", 4000, 3)).unwrap();
        store.update_ranks().unwrap();

        let rank = |name: &str| store.find_by_name(name).unwrap().unwrap().rank_ladder_mmr;
        assert_eq!(rank("a"), 2);
        assert_eq!(rank("b"), 2);
        assert_eq!(rank("c"), 3);
    }

    #[test]
    fn test_new_season_reseeds_players() {
        let store = InMemoryLadderStore::default();
        let player = store.register_player(new_player("SMMN", 4000, 1)).unwrap();
        store
            .add_score_change(ScoreChange::new(player.id.clone(), 3, 150, "games", 1))
            .unwrap();

        assert_eq!(store.start_new_season().unwrap(), 2);
        let reseeded = store.get_player(&player.id).unwrap().unwrap();
        assert_eq!(reseeded.ladder_mmr, 4000);
        assert_eq!(reseeded.score, 25);
        assert_eq!(store.settings().unwrap().current_season, 2);
    }

    #[test]
    fn test_rating_boundaries_correct_outliers() {
        let store = InMemoryLadderStore::default();
        let high = store.register_player(new_player("high", 3000, 1)).unwrap();
        let ok = store.register_player(new_player("ok", 3000, 2)).unwrap();
        store
            .add_score_change(ScoreChange::new(high.id.clone(), 5, 300, "streak", 1))
            .unwrap();

        assert_eq!(store.apply_rating_boundaries(200).unwrap(), 1);
        let high = store.get_player(&high.id).unwrap().unwrap();
        assert_eq!(high.ladder_mmr, 3200);
        assert_eq!(high.rating_bounds(), Some((2800, 3200)));
        assert_eq!(store.get_player(&ok.id).unwrap().unwrap().ladder_mmr, 3000);
    }

    #[test]
    fn test_join_open_queue_fills_oldest_first() {
        let store = InMemoryLadderStore::default();
        let channel = store.create_channel(QueueChannel::new("main", 0)).unwrap();
        let players: Vec<Player> = (0..5)
            .map(|i| {
                store
                    .register_player(new_player(&format!("p{}", i), 3000, i + 1))
                    .unwrap()
            })
            .collect();

        let first = store.join_open_queue(channel.id, &players[0].id, 2, None).unwrap();
        let same = store.join_open_queue(channel.id, &players[1].id, 2, None).unwrap();
        assert_eq!(first.id, same.id);
        assert!(same.is_full());

        let second = store.join_open_queue(channel.id, &players[2].id, 2, None).unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.len(), 1);

        // A rating the open queue refuses starts a queue of its own
        let mut filtered = store.get_queue(second.id).unwrap().unwrap();
        filtered.min_rating = 4000;
        store.write().unwrap().queues.insert(filtered.id, filtered);
        let third = store
            .join_open_queue(channel.id, &players[3].id, 2, Some(3000))
            .unwrap();
        assert_ne!(third.id, second.id);

        // Refused joins leave no empty queue behind
        let other = store.create_channel(QueueChannel::new("other", 0)).unwrap();
        let queues = store.active_queues().unwrap().len();
        assert!(store.join_open_queue(other.id, &players[0].id, 2, None).is_err());
        assert_eq!(store.active_queues().unwrap().len(), queues);
        assert!(store
            .join_open_queue(uuid::Uuid::new_v4(), &players[4].id, 2, None)
            .is_err());
    }

    #[test]
    fn test_queue_membership_rules() {
        let store = InMemoryLadderStore::default();
        let channel = store.create_channel(QueueChannel::new("main", 0)).unwrap();
        let queue = store.create_queue(channel.id, 2).unwrap();
        let a = store.register_player(new_player("a", 3000, 1)).unwrap();
        let b = store.register_player(new_player("b", 3000, 2)).unwrap();
        let c = store.register_player(new_player("c", 3000, 3)).unwrap();

        store.add_queue_player(queue.id, &a.id).unwrap();
        assert!(store.add_queue_player(queue.id, &a.id).is_err());
        let full = store.add_queue_player(queue.id, &b.id).unwrap();
        assert!(full.is_full());
        assert!(store.add_queue_player(queue.id, &c.id).is_err());

        assert!(store.set_channel_min_rating(channel.id, 2000).is_err());
        assert_eq!(
            store.active_queue_for_player(&b.id).unwrap().map(|q| q.id),
            Some(queue.id)
        );

        store.remove_queue_player(queue.id, &a.id).unwrap();
        let emptied = store.remove_queue_player(queue.id, &b.id).unwrap();
        assert!(!emptied.active);
        assert!(store.active_queues().unwrap().is_empty());
        assert!(store.set_channel_min_rating(channel.id, 2000).is_ok());
    }
}
