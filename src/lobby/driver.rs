//! Lobby driver capability
//!
//! A driver is one bot session with the game client. Workers hold it as a
//! handle and never see the wire protocol behind it.

use crate::config::LobbySettings;
use crate::error::Result;
use crate::types::{AccountId, GameMode, LobbyMember, MatchOutcome, Region};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Options a lobby is created or updated with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyOptions {
    pub name: String,
    pub password: String,
    pub region: Region,
    pub mode: GameMode,
}

impl From<&LobbySettings> for LobbyOptions {
    fn from(settings: &LobbySettings) -> Self {
        Self {
            name: settings.name.clone(),
            password: settings.password.clone(),
            region: settings.region,
            mode: settings.mode,
        }
    }
}

/// Lobby state as reported by the game client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    Ui,
    ReadyUp,
    ServerSetup,
    Run,
    PostGame,
}

/// Notifications pushed by a driver session
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// A requested lobby now exists
    LobbyCreated,
    MembersChanged,
    StateChanged(LobbyState),
    ChatMessage { account_id: AccountId, text: String },
    /// The session dropped; events stop until the next `connect`
    Disconnected,
}

/// Operations a worker needs from the game client session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LobbyDriver: Send + Sync {
    /// Log in, failing when the session cannot be established
    async fn connect(&self) -> Result<()>;

    /// Receive events of the current session
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<LobbyEvent>>;

    async fn create_lobby(&self, options: &LobbyOptions) -> Result<()>;

    async fn destroy_lobby(&self) -> Result<()>;

    async fn set_options(&self, options: &LobbyOptions) -> Result<()>;

    async fn members(&self) -> Result<Vec<LobbyMember>>;

    /// Remove a member from the lobby
    async fn kick(&self, account_id: AccountId) -> Result<()>;

    /// Move a member out of their team slot
    async fn kick_from_team(&self, account_id: AccountId) -> Result<()>;

    async fn send_message(&self, text: &str) -> Result<()>;

    async fn launch(&self) -> Result<()>;

    /// Outcome of the last game, `NotScored` while none is known
    async fn outcome(&self) -> Result<MatchOutcome>;

    /// External id of the last game
    async fn match_id(&self) -> Result<Option<u64>>;
}
