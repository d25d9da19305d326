//! In-process lobby driver
//!
//! Keeps lobby membership, slots and game state in memory and emits the same
//! events a real game client session would. Used by tests and `--simulate`.

use crate::error::{LadderError, Result};
use crate::lobby::driver::{LobbyDriver, LobbyEvent, LobbyOptions, LobbyState};
use crate::types::{AccountId, LobbyMember, LobbySlot, MatchOutcome};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct SimulatedLobby {
    connected: bool,
    /// Upcoming `connect` calls that fail
    failing_connects: u32,
    lobby_open: bool,
    options: Option<LobbyOptions>,
    state: Option<LobbyState>,
    members: Vec<LobbyMember>,
    outcome: Option<MatchOutcome>,
    match_id: Option<u64>,
    messages: Vec<String>,
    kicked: Vec<AccountId>,
    team_kicked: Vec<AccountId>,
    launches: u32,
    lobbies_created: u32,
    subscribers: Vec<mpsc::UnboundedSender<LobbyEvent>>,
}

impl SimulatedLobby {
    fn emit(&mut self, event: LobbyEvent) {
        self.subscribers
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

/// Lobby driver backed by memory
#[derive(Debug, Default)]
pub struct SimulatedLobbyDriver {
    name: String,
    lobby: Mutex<SimulatedLobby>,
}

impl SimulatedLobbyDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lobby: Mutex::new(SimulatedLobby::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, SimulatedLobby>, LadderError> {
        self.lobby
            .lock()
            .map_err(|_| LadderError::lock("simulated lobby"))
    }

    fn require_lobby(lobby: &SimulatedLobby) -> std::result::Result<(), LadderError> {
        if !lobby.connected {
            return Err(LadderError::Driver {
                message: "not connected".to_string(),
            });
        }
        if !lobby.lobby_open {
            return Err(LadderError::Driver {
                message: "no lobby".to_string(),
            });
        }
        Ok(())
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: u32) -> Result<()> {
        self.lock()?.failing_connects = count;
        Ok(())
    }

    /// A player enters the lobby in `slot`
    pub fn join(&self, account_id: AccountId, name: &str, slot: LobbySlot) -> Result<()> {
        let mut lobby = self.lock()?;
        Self::require_lobby(&lobby)?;
        lobby.members.retain(|m| m.account_id != account_id);
        lobby.members.push(LobbyMember {
            account_id,
            name: name.to_string(),
            slot,
        });
        lobby.emit(LobbyEvent::MembersChanged);
        Ok(())
    }

    /// A player switches slot
    pub fn move_to(&self, account_id: AccountId, slot: LobbySlot) -> Result<()> {
        let mut lobby = self.lock()?;
        let member = lobby
            .members
            .iter_mut()
            .find(|m| m.account_id == account_id)
            .ok_or_else(|| LadderError::Driver {
                message: format!("{} is not in the lobby", account_id),
            })?;
        member.slot = slot;
        lobby.emit(LobbyEvent::MembersChanged);
        Ok(())
    }

    pub fn leave(&self, account_id: AccountId) -> Result<()> {
        let mut lobby = self.lock()?;
        lobby.members.retain(|m| m.account_id != account_id);
        lobby.emit(LobbyEvent::MembersChanged);
        Ok(())
    }

    /// A lobby member writes in lobby chat
    pub fn chat(&self, account_id: AccountId, text: &str) -> Result<()> {
        let mut lobby = self.lock()?;
        lobby.emit(LobbyEvent::ChatMessage {
            account_id,
            text: text.to_string(),
        });
        Ok(())
    }

    /// The running game ends with `outcome`
    pub fn finish_game(&self, outcome: MatchOutcome, match_id: u64) -> Result<()> {
        let mut lobby = self.lock()?;
        lobby.outcome = Some(outcome);
        lobby.match_id = Some(match_id);
        lobby.state = Some(LobbyState::PostGame);
        lobby.emit(LobbyEvent::StateChanged(LobbyState::PostGame));
        Ok(())
    }

    /// Drop the session
    pub fn disconnect(&self) -> Result<()> {
        let mut lobby = self.lock()?;
        lobby.connected = false;
        lobby.emit(LobbyEvent::Disconnected);
        lobby.subscribers.clear();
        Ok(())
    }

    pub fn messages(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.messages.clone())
    }

    pub fn kicked(&self) -> Result<Vec<AccountId>> {
        Ok(self.lock()?.kicked.clone())
    }

    pub fn team_kicked(&self) -> Result<Vec<AccountId>> {
        Ok(self.lock()?.team_kicked.clone())
    }

    pub fn launches(&self) -> Result<u32> {
        Ok(self.lock()?.launches)
    }

    pub fn lobbies_created(&self) -> Result<u32> {
        Ok(self.lock()?.lobbies_created)
    }

    pub fn options(&self) -> Result<Option<LobbyOptions>> {
        Ok(self.lock()?.options.clone())
    }

    pub fn lobby_state(&self) -> Result<Option<LobbyState>> {
        Ok(self.lock()?.state)
    }
}

#[async_trait]
impl LobbyDriver for SimulatedLobbyDriver {
    async fn connect(&self) -> Result<()> {
        let mut lobby = self.lock()?;
        if lobby.failing_connects > 0 {
            lobby.failing_connects -= 1;
            return Err(LadderError::Driver {
                message: format!("{} failed to log in", self.name),
            }
            .into());
        }
        lobby.connected = true;
        debug!("{} connected", self.name);
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<LobbyEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock()?.subscribers.push(sender);
        Ok(receiver)
    }

    async fn create_lobby(&self, options: &LobbyOptions) -> Result<()> {
        let mut lobby = self.lock()?;
        if !lobby.connected {
            return Err(LadderError::Driver {
                message: "not connected".to_string(),
            }
            .into());
        }
        lobby.lobby_open = true;
        lobby.options = Some(options.clone());
        lobby.state = Some(LobbyState::Ui);
        lobby.members.clear();
        lobby.outcome = None;
        lobby.match_id = None;
        lobby.lobbies_created += 1;
        lobby.emit(LobbyEvent::LobbyCreated);
        Ok(())
    }

    async fn destroy_lobby(&self) -> Result<()> {
        let mut lobby = self.lock()?;
        lobby.lobby_open = false;
        lobby.state = None;
        lobby.members.clear();
        Ok(())
    }

    async fn set_options(&self, options: &LobbyOptions) -> Result<()> {
        let mut lobby = self.lock()?;
        Self::require_lobby(&lobby)?;
        lobby.options = Some(options.clone());
        Ok(())
    }

    async fn members(&self) -> Result<Vec<LobbyMember>> {
        let lobby = self.lock()?;
        Self::require_lobby(&lobby)?;
        Ok(lobby.members.clone())
    }

    async fn kick(&self, account_id: AccountId) -> Result<()> {
        let mut lobby = self.lock()?;
        Self::require_lobby(&lobby)?;
        lobby.members.retain(|m| m.account_id != account_id);
        lobby.kicked.push(account_id);
        lobby.emit(LobbyEvent::MembersChanged);
        Ok(())
    }

    async fn kick_from_team(&self, account_id: AccountId) -> Result<()> {
        let mut lobby = self.lock()?;
        Self::require_lobby(&lobby)?;
        if let Some(member) = lobby
            .members
            .iter_mut()
            .find(|m| m.account_id == account_id)
        {
            member.slot = LobbySlot::Unassigned;
        }
        lobby.team_kicked.push(account_id);
        lobby.emit(LobbyEvent::MembersChanged);
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let mut lobby = self.lock()?;
        lobby.messages.push(text.to_string());
        Ok(())
    }

    async fn launch(&self) -> Result<()> {
        let mut lobby = self.lock()?;
        Self::require_lobby(&lobby)?;
        lobby.launches += 1;
        lobby.state = Some(LobbyState::Run);
        lobby.emit(LobbyEvent::StateChanged(LobbyState::Run));
        Ok(())
    }

    async fn outcome(&self) -> Result<MatchOutcome> {
        Ok(self.lock()?.outcome.unwrap_or(MatchOutcome::NotScored))
    }

    async fn match_id(&self) -> Result<Option<u64>> {
        Ok(self.lock()?.match_id)
    }
}
