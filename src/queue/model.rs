//! Queue channels and queues

use crate::balancer::TeamSplit;
use crate::types::{ChannelId, PlayerId, QueueId, Rating};
use crate::utils::{current_timestamp, generate_queue_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A place players queue in, e.g. one discord channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueChannel {
    pub id: ChannelId,
    pub name: String,
    /// Minimum ladder rating to join queues of this channel
    pub min_rating: Rating,
    /// Optional upper rating limit for queues of this channel
    pub max_rating: Option<Rating>,
    pub discord_id: Option<String>,
}

impl QueueChannel {
    pub fn new(name: impl Into<String>, min_rating: Rating) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            min_rating,
            max_rating: None,
            discord_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMember {
    pub player_id: PlayerId,
    pub joined_at: DateTime<Utc>,
}

/// Players waiting for one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderQueue {
    pub id: QueueId,
    pub channel_id: ChannelId,
    /// Members in join order
    pub members: Vec<QueueMember>,
    pub capacity: usize,
    pub min_rating: Rating,
    pub max_rating: Option<Rating>,
    pub active: bool,
    /// Set once a worker launched the game for this queue
    pub game_started_at: Option<DateTime<Utc>>,
    /// Best split, stored when the queue fills up
    pub proposed: Option<TeamSplit>,
    pub created_at: DateTime<Utc>,
}

impl LadderQueue {
    pub fn new(channel: &QueueChannel, capacity: usize) -> Self {
        Self {
            id: generate_queue_id(),
            channel_id: channel.id,
            members: Vec::new(),
            capacity,
            min_rating: channel.min_rating,
            max_rating: channel.max_rating,
            active: true,
            game_started_at: None,
            proposed: None,
            created_at: current_timestamp(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.iter().any(|m| m.player_id == player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.player_id.clone()).collect()
    }

    pub fn game_started(&self) -> bool {
        self.game_started_at.is_some()
    }

    /// Whether a player rated `rating` passes this queue's filter
    pub fn admits_rating(&self, rating: Rating) -> bool {
        rating >= self.min_rating && self.max_rating.map_or(true, |max| rating <= max)
    }
}
