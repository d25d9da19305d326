//! AFK watchdog
//!
//! Periodically drops players who have waited longer than the idle limit in
//! a queue that has not filled up. It only ever edits queues; workers pick
//! up the change on the next reconciliation tick.

use crate::error::Result;
use crate::rating::storage::LadderStore;
use crate::types::{PlayerId, QueueId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

pub struct AfkWatchdog {
    store: Arc<dyn LadderStore>,
    idle_limit: Duration,
    check_interval: Duration,
}

impl AfkWatchdog {
    pub fn new(store: Arc<dyn LadderStore>, idle_limit: Duration, check_interval: Duration) -> Self {
        Self {
            store,
            idle_limit,
            check_interval,
        }
    }

    /// Remove idle members as of `now`, returning who was removed from where
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<(QueueId, PlayerId)>> {
        let limit = ChronoDuration::from_std(self.idle_limit)?;
        let mut removed = Vec::new();

        for queue in self.store.active_queues()? {
            if queue.is_full() || queue.game_started() {
                continue;
            }
            for member in &queue.members {
                if now - member.joined_at > limit {
                    self.store.remove_queue_player(queue.id, &member.player_id)?;
                    info!(
                        "Removed {} from queue {} after {} minutes idle",
                        member.player_id,
                        queue.id,
                        (now - member.joined_at).num_minutes()
                    );
                    removed.push((queue.id, member.player_id.clone()));
                }
            }
        }

        Ok(removed)
    }

    /// Sweep on a fixed interval until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()) {
                        error!("AFK sweep failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("AFK watchdog shutting down");
                    break;
                }
            }
        }
    }
}
