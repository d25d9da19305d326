//! Queue admission
//!
//! Joining checks vouch and ban status, the channel and queue rating
//! filters and that the player is not already queued. A queue that fills up
//! is balanced immediately and the best split is stored as its proposal.

use crate::balancer::{BalancePlayer, Balancer, TeamSplit};
use crate::error::{LadderError, Result};
use crate::queue::model::LadderQueue;
use crate::rating::storage::LadderStore;
use crate::types::{ChannelId, Player, QueueId, Rating};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of adding a player to a queue
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub queue: LadderQueue,
    /// Proposed split, present when this join filled the queue
    pub proposal: Option<TeamSplit>,
}

impl JoinOutcome {
    pub fn filled(&self) -> bool {
        self.proposal.is_some()
    }
}

/// Queue operations used by chat frontends
pub struct QueueService {
    store: Arc<dyn LadderStore>,
    balancer: Balancer,
}

impl QueueService {
    pub fn new(store: Arc<dyn LadderStore>, balancer: Balancer) -> Self {
        Self { store, balancer }
    }

    fn player(&self, player_id: &str) -> Result<Player> {
        self.store.get_player(player_id)?.ok_or_else(|| {
            LadderError::PlayerNotFound {
                player: player_id.to_string(),
            }
            .into()
        })
    }

    /// Join the first open queue of `channel_id`, creating one if needed
    pub fn join(&self, player_id: &str, channel_id: ChannelId) -> Result<JoinOutcome> {
        let player = self.player(player_id)?;
        if !player.vouched {
            return Err(LadderError::NotVouched {
                player: player.name,
            }
            .into());
        }
        self.admit(player, channel_id, true)
    }

    /// Staff variant of `join`, skipping the vouch and rating checks
    pub fn add_by_staff(&self, player_id: &str, channel_id: ChannelId) -> Result<JoinOutcome> {
        let player = self.player(player_id)?;
        info!("Staff adding {} to a queue in channel {}", player.name, channel_id);
        self.admit(player, channel_id, false)
    }

    fn admit(&self, player: Player, channel_id: ChannelId, check_rating: bool) -> Result<JoinOutcome> {
        if player.is_banned_from_playing() {
            return Err(LadderError::Banned {
                player: player.name,
            }
            .into());
        }

        let channel =
            self.store
                .get_channel(channel_id)?
                .ok_or_else(|| LadderError::ChannelNotFound {
                    channel_id: channel_id.to_string(),
                })?;

        if check_rating && player.ladder_mmr < channel.min_rating {
            return Err(LadderError::RatingOutOfRange {
                player: player.name,
                rating: player.ladder_mmr,
                min: channel.min_rating,
                max: channel.max_rating.unwrap_or(Rating::MAX),
            }
            .into());
        }

        if self.store.active_queue_for_player(&player.id)?.is_some() {
            return Err(LadderError::AlreadyQueued {
                player: player.name,
            }
            .into());
        }

        let capacity = self.balancer.config().roster_size();
        let rating = check_rating.then_some(player.ladder_mmr);
        let queue = self
            .store
            .join_open_queue(channel_id, &player.id, capacity, rating)?;
        info!(
            "{} joined queue {} ({}/{})",
            player.name,
            queue.id,
            queue.len(),
            queue.capacity
        );

        let proposal = if queue.is_full() {
            match self.balance_queue(&queue) {
                Ok(split) => Some(split),
                Err(e) => {
                    // Full queues always carry a proposal
                    warn!(
                        "Queue {} could not be balanced, removing {}: {}",
                        queue.id, player.name, e
                    );
                    self.store.remove_queue_player(queue.id, &player.id)?;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let queue = self.store.get_queue(queue.id)?.unwrap_or(queue);
        Ok(JoinOutcome { queue, proposal })
    }

    /// Balance a full queue and store the best split as its proposal
    pub fn balance_queue(&self, queue: &LadderQueue) -> Result<TeamSplit> {
        let mut roster = Vec::with_capacity(queue.len());
        for player_id in queue.player_ids() {
            roster.push(BalancePlayer::from(&self.player(&player_id)?));
        }

        let result = self.balancer.balance(roster)?;
        let best = result.candidate(0)?.clone();
        self.store.set_queue_balance(queue.id, Some(best.clone()))?;

        info!(
            "Queue {} is full, proposed split with rating difference {:.0}",
            queue.id, best.mmr_diff
        );
        Ok(best)
    }

    /// Leave the player's active queue; `None` when they were not queuing
    pub fn leave(&self, player_id: &str) -> Result<Option<LadderQueue>> {
        let Some(queue) = self.store.active_queue_for_player(player_id)? else {
            debug!("{} is not queuing", player_id);
            return Ok(None);
        };
        let queue = self.store.remove_queue_player(queue.id, player_id)?;
        info!("{} left queue {}", player_id, queue.id);
        Ok(Some(queue))
    }

    /// Staff removal of a player from their active queue
    pub fn kick(&self, player_id: &str) -> Result<Option<LadderQueue>> {
        let removed = self.leave(player_id)?;
        if removed.is_some() {
            warn!("{} was kicked from their queue", player_id);
        }
        Ok(removed)
    }

    pub fn close(&self, queue_id: QueueId) -> Result<()> {
        self.store.close_queue(queue_id)
    }

    /// Change a channel's minimum rating, refused while it has an active queue
    pub fn set_channel_min_rating(&self, channel_id: ChannelId, min_rating: Rating) -> Result<()> {
        let min_rating = min_rating.clamp(0, 9000);
        self.store.set_channel_min_rating(channel_id, min_rating)?;
        info!("Channel {} minimum rating set to {}", channel_id, min_rating);
        Ok(())
    }

    pub fn active_queues(&self) -> Result<Vec<LadderQueue>> {
        self.store.active_queues()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BalancerConfig;
    use crate::queue::model::QueueChannel;
    use crate::rating::storage::InMemoryLadderStore;
    use crate::types::{BanLevel, NewPlayer, RoleScores};

    type Setup = (Arc<InMemoryLadderStore>, QueueService, ChannelId, Vec<Player>);

    fn setup(ratings: &[Rating]) -> Setup {
        setup_with(ratings, Balancer::default())
    }

    fn setup_with(ratings: &[Rating], balancer: Balancer) -> Setup {
        let store = Arc::new(InMemoryLadderStore::default());
        let channel = store.create_channel(QueueChannel::new("main", 2000)).unwrap();

        let players = ratings
            .iter()
            .enumerate()
            .map(|(i, rating)| {
                let mut player = store
                    .register_player(NewPlayer {
                        name: format!("player{}", i),
                        dota_mmr: *rating,
                        account_id: Some(i as u64 + 1),
                        discord_id: None,
                        roles: RoleScores::default(),
                    })
                    .unwrap();
                player.vouched = true;
                store.update_player(player.clone()).unwrap();
                player
            })
            .collect();

        let service = QueueService::new(store.clone(), balancer);
        (store, service, channel.id, players)
    }

    fn error_of(result: Result<JoinOutcome>) -> LadderError {
        result
            .unwrap_err()
            .downcast_ref::<LadderError>()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_join_rules() {
        let (store, service, channel, players) = setup(&[5000, 1000, 5000, 5000]);

        assert!(service.join(&players[0].id, channel).is_ok());
        assert!(matches!(
            error_of(service.join(&players[0].id, channel)),
            LadderError::AlreadyQueued { .. }
        ));
        assert!(matches!(
            error_of(service.join(&players[1].id, channel)),
            LadderError::RatingOutOfRange { .. }
        ));

        let mut unvouched = players[2].clone();
        unvouched.vouched = false;
        store.update_player(unvouched).unwrap();
        assert!(matches!(
            error_of(service.join(&players[2].id, channel)),
            LadderError::NotVouched { .. }
        ));

        let mut banned = players[3].clone();
        banned.banned = Some(BanLevel::Playing);
        store.update_player(banned).unwrap();
        assert!(matches!(
            error_of(service.join(&players[3].id, channel)),
            LadderError::Banned { .. }
        ));

        // Staff can add the low rated player
        let outcome = service.add_by_staff(&players[1].id, channel).unwrap();
        assert_eq!(outcome.queue.len(), 2);
    }

    #[test]
    fn test_full_queue_gets_proposal() {
        let ratings = [8000, 6200, 6000, 5500, 5000, 5000, 4000, 3500, 3000, 2400];
        let (store, service, channel, players) = setup(&ratings);

        let mut last = None;
        for player in &players {
            last = Some(service.join(&player.id, channel).unwrap());
        }
        let outcome = last.unwrap();
        assert!(outcome.filled());
        assert!(outcome.queue.is_full());
        assert!(outcome.queue.proposed.is_some());
        assert_eq!(store.active_queues().unwrap().len(), 1);

        // The next player starts a fresh queue
        let mut extra = store
            .register_player(NewPlayer {
                name: "late".to_string(),
                dota_mmr: 4000,
                account_id: Some(99),
                discord_id: None,
                roles: RoleScores::default(),
            })
            .unwrap();
        extra.vouched = true;
        store.update_player(extra.clone()).unwrap();
        let outcome = service.join(&extra.id, channel).unwrap();
        assert_eq!(outcome.queue.len(), 1);
        assert_eq!(store.active_queues().unwrap().len(), 2);
    }

    #[test]
    fn test_unbalanceable_roster_gives_the_last_seat_back() {
        let mut ratings = vec![9000];
        ratings.extend([1000; 9]);
        let balancer = Balancer::new(BalancerConfig::default().with_role_balancing());
        let (store, service, channel, players) = setup_with(&ratings, balancer);

        for player in &players[..9] {
            assert!(!service.add_by_staff(&player.id, channel).unwrap().filled());
        }
        assert!(service.add_by_staff(&players[9].id, channel).is_err());

        // The queue is left as it was before the refused join
        assert!(store.active_queue_for_player(&players[9].id).unwrap().is_none());
        let queues = store.active_queues().unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].len(), 9);
        assert!(queues[0].proposed.is_none());
    }

    #[test]
    fn test_leave_and_min_rating_change() {
        let (_store, service, channel, players) = setup(&[5000]);
        service.join(&players[0].id, channel).unwrap();
        assert!(service.set_channel_min_rating(channel, 3000).is_err());

        let left = service.leave(&players[0].id).unwrap().unwrap();
        assert!(!left.active);
        assert!(service.leave(&players[0].id).unwrap().is_none());
        assert!(service.set_channel_min_rating(channel, 3000).is_ok());
    }
}
