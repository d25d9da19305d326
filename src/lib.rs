//! Inhouse Ladder - team balancing and lobby automation for a 5v5 ladder
//!
//! This crate balances ten-player rosters into two teams, scores finished
//! matches into a seasonal ladder, admits players into queues and runs lobby
//! workers that a scheduler pairs with filled queues.

pub mod balancer;
pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod queue;
pub mod rating;
pub mod scheduler;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LadderError, Result};
pub use types::*;

// Re-export key components
pub use balancer::{BalanceResult, Balancer, TeamSplit};
pub use lobby::{LobbyDriver, SimulatedLobbyDriver, WorkerHandle};
pub use queue::QueueService;
pub use rating::{InMemoryLadderStore, LadderStore, MatchRecorder, RatingUpdater};
pub use scheduler::Scheduler;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
