//! Lobby workers for the ladder service
//!
//! Each worker drives one game-client session through a `LobbyDriver`,
//! enforces who may sit in its lobby, runs chat commands and records the
//! result when a game ends.

pub mod chat;
pub mod driver;
pub mod enforcement;
pub mod simulated;
pub mod worker;

// Re-export commonly used types
pub use driver::{LobbyDriver, LobbyEvent, LobbyOptions, LobbyState};
pub use enforcement::{check_teams, plan_kicks, Kick, KickReason, Policy, TeamCheck};
pub use simulated::SimulatedLobbyDriver;
pub use worker::{
    connect_with_retry, spawn, CommandReply, RetryPolicy, WorkerCommand, WorkerDeps,
    WorkerHandle, WorkerMessage, WorkerState, WorkerStatus,
};
