//! Test fixtures for integration testing
//!
//! Builds a ladder service around simulated lobby sessions and registers
//! rosters of vouched players with game accounts.

#![allow(dead_code)]

use inhouse_ladder::balancer::TeamSplit;
use inhouse_ladder::config::AppConfig;
use inhouse_ladder::lobby::LobbyDriver;
use inhouse_ladder::queue::QueueChannel;
use inhouse_ladder::service::AppState;
use inhouse_ladder::types::{LobbySlot, NewPlayer, Player, RoleScores};
use inhouse_ladder::{LadderStore, SimulatedLobbyDriver};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Ratings of the reference ten player roster
pub const REFERENCE_RATINGS: [i32; 10] = [
    8000, 6200, 6000, 5500, 5000, 5000, 4000, 3500, 3000, 2400,
];

/// Service under test plus handles on its simulated sessions
pub struct TestLadder {
    pub app: Arc<AppState>,
    pub drivers: Vec<Arc<SimulatedLobbyDriver>>,
}

impl TestLadder {
    pub fn store(&self) -> Arc<dyn LadderStore> {
        self.app.store()
    }

    /// Simulated session of the worker named `worker_id`
    pub fn driver(&self, worker_id: &str) -> Arc<SimulatedLobbyDriver> {
        self.drivers
            .iter()
            .find(|d| d.name() == worker_id)
            .cloned()
            .unwrap_or_else(|| panic!("no driver named {}", worker_id))
    }
}

/// Configuration with fast driver retries
pub fn test_config(workers: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.driver.worker_count = workers;
    config.driver.retry_delay_ms = 1;
    config
}

/// Build the service with `workers` simulated sessions, all lobbies open
pub async fn create_test_ladder(workers: usize) -> TestLadder {
    create_test_ladder_with(test_config(workers)).await
}

pub async fn create_test_ladder_with(config: AppConfig) -> TestLadder {
    let drivers: Vec<Arc<SimulatedLobbyDriver>> = (0..config.driver.worker_count)
        .map(|i| {
            Arc::new(SimulatedLobbyDriver::new(format!(
                "{}{}",
                config.driver.login_prefix,
                i + 1
            )))
        })
        .collect();
    let sessions = drivers
        .iter()
        .map(|d| (d.name().to_string(), d.clone() as Arc<dyn LobbyDriver>))
        .collect();

    let app = Arc::new(
        AppState::with_drivers(config, sessions)
            .await
            .expect("Failed to build ladder service"),
    );
    for worker in app.scheduler().workers() {
        worker
            .wait_for(|s| s.connected && s.is_available(), WAIT)
            .await
            .expect("Worker never opened a lobby");
    }

    TestLadder { app, drivers }
}

/// Register vouched players with the given ratings; account ids start at `first_account`
pub fn register_players(
    store: &dyn LadderStore,
    prefix: &str,
    ratings: &[i32],
    first_account: u64,
) -> Vec<Player> {
    ratings
        .iter()
        .enumerate()
        .map(|(i, &rating)| {
            let mut player = store
                .register_player(NewPlayer {
                    name: format!("{}{}", prefix, i + 1),
                    dota_mmr: rating,
                    account_id: Some(first_account + i as u64),
                    discord_id: None,
                    roles: RoleScores::default(),
                })
                .expect("Failed to register player");
            player.vouched = true;
            store
                .update_player(player.clone())
                .expect("Failed to vouch player");
            player
        })
        .collect()
}

/// Register a roster and queue every player in a fresh channel
pub fn queue_roster(
    ladder: &TestLadder,
    channel: &str,
    ratings: &[i32],
    first_account: u64,
) -> (QueueChannel, Vec<Player>) {
    let store = ladder.store();
    let channel = store
        .create_channel(QueueChannel::new(channel, 0))
        .expect("Failed to create channel");
    let players = register_players(store.as_ref(), &channel.name, ratings, first_account);
    for player in &players {
        ladder
            .app
            .queue_service()
            .join(&player.id, channel.id)
            .expect("Failed to join queue");
    }
    (channel, players)
}

/// Seat every player on the side `split` assigns, unlisted players spectate
pub fn seat_as(driver: &SimulatedLobbyDriver, players: &[Player], split: &TeamSplit) {
    for player in players {
        let slot = match split.team_of(&player.id) {
            Some(0) => LobbySlot::Radiant,
            Some(_) => LobbySlot::Dire,
            None => LobbySlot::Spectator,
        };
        let account = player.account_id.expect("Test players have accounts");
        driver
            .join(account, &player.name, slot)
            .expect("Failed to seat player");
    }
}

/// Seat everyone on the opposite side of `split`
pub fn seat_mirrored(driver: &SimulatedLobbyDriver, players: &[Player], split: &TeamSplit) {
    let mut mirrored = split.clone();
    mirrored.swap_sides();
    seat_as(driver, players, &mirrored);
}
