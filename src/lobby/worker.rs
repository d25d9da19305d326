//! Lobby worker
//!
//! One worker owns one driver session and at most one live lobby. All of its
//! state lives inside a single task; the scheduler and chat reach it through
//! the message inbox and read its published status through a watch channel.

use crate::balancer::{BalancePlayer, BalanceResult, Balancer, TeamSplit};
use crate::config::{DriverSettings, LobbySettings};
use crate::error::{LadderError, Result};
use crate::lobby::chat;
use crate::lobby::driver::{LobbyDriver, LobbyEvent, LobbyOptions, LobbyState};
use crate::lobby::enforcement::{check_teams, plan_kicks, Policy, TeamCheck};
use crate::metrics::MetricsCollector;
use crate::queue::LadderQueue;
use crate::rating::{LadderStore, MatchRecorder};
use crate::types::{AccountId, GameMode, LobbyMember, Player, QueueId, Region, WorkerId};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

const INBOX_CAPACITY: usize = 64;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a worker's lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No session yet
    Idle,
    /// Lobby requested, waiting for the client to confirm it
    Configuring,
    Open,
    InGame,
    PostGame,
}

impl WorkerState {
    pub const ALL: [WorkerState; 5] = [
        WorkerState::Idle,
        WorkerState::Configuring,
        WorkerState::Open,
        WorkerState::InGame,
        WorkerState::PostGame,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Configuring => "configuring",
            WorkerState::Open => "open",
            WorkerState::InGame => "in_game",
            WorkerState::PostGame => "postgame",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot a worker publishes after every change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub state: WorkerState,
    pub connected: bool,
    pub queue_id: Option<QueueId>,
    pub balanced: bool,
    pub members: usize,
}

impl WorkerStatus {
    fn idle(id: WorkerId) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            connected: false,
            queue_id: None,
            balanced: false,
            members: 0,
        }
    }

    /// Whether the worker can take a queue: connected and not busy with a game
    pub fn can_take_queue(&self) -> bool {
        self.connected && !matches!(self.state, WorkerState::InGame | WorkerState::PostGame)
    }

    /// Able to take a queue and not holding one. The scheduler judges
    /// holding by its own bindings rather than the published queue id.
    pub fn is_available(&self) -> bool {
        self.can_take_queue() && self.queue_id.is_none()
    }
}

/// Commands accepted from lobby chat and from the service
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    Balance,
    /// Pick another candidate of the last balance, zero based
    Rebalance(usize),
    ClearBalance,
    Swap(String, String),
    Start,
    ForceStart,
    SetMinRating(i32),
    SetRegion(Region),
    SetMode(GameMode),
    SetVoiceRequired(bool),
    SetStaffOnly(bool),
    Status,
}

impl WorkerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCommand::Balance => "balance",
            WorkerCommand::Rebalance(_) => "rebalance",
            WorkerCommand::ClearBalance => "balance_off",
            WorkerCommand::Swap(_, _) => "swap",
            WorkerCommand::Start => "start",
            WorkerCommand::ForceStart => "forcestart",
            WorkerCommand::SetMinRating(_) => "mmr",
            WorkerCommand::SetRegion(_) => "region",
            WorkerCommand::SetMode(_) => "mode",
            WorkerCommand::SetVoiceRequired(_) => "voice",
            WorkerCommand::SetStaffOnly(_) => "staff",
            WorkerCommand::Status => "status",
        }
    }
}

/// Result of a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Balanced { split: TeamSplit, candidate: usize },
    BalanceCleared,
    Starting { countdown: Duration },
    Launched { balanced: bool },
    /// Players that are not sitting where the balance puts them
    MustMove(Vec<String>),
    Updated(String),
    Status(WorkerStatus),
    Refused(String),
}

impl CommandReply {
    pub fn is_refusal(&self) -> bool {
        matches!(self, CommandReply::Refused(_) | CommandReply::MustMove(_))
    }
}

/// Messages accepted by a worker task
#[derive(Debug)]
pub enum WorkerMessage {
    Command(
        WorkerCommand,
        oneshot::Sender<std::result::Result<CommandReply, LadderError>>,
    ),
    /// Reserve the lobby for a queue
    Bind(LadderQueue),
    /// Fresh copy of the bound queue
    Refresh(LadderQueue),
    Unbind,
    CountdownElapsed,
    Shutdown,
}

/// Shared services a worker records and looks up through
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn LadderStore>,
    pub balancer: Balancer,
    pub recorder: Arc<MatchRecorder>,
    pub metrics: Arc<MetricsCollector>,
}

/// Reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&DriverSettings> for RetryPolicy {
    fn from(settings: &DriverSettings) -> Self {
        Self {
            max_attempts: settings.max_retry_attempts,
            base_delay: Duration::from_millis(settings.retry_delay_ms),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Connect and subscribe with exponential backoff
pub async fn connect_with_retry(
    driver: &dyn LobbyDriver,
    retry: &RetryPolicy,
    worker: &str,
) -> Result<mpsc::UnboundedReceiver<LobbyEvent>> {
    let mut retry_count = 0;
    let mut delay = retry.base_delay;

    loop {
        let attempt = match driver.connect().await {
            Ok(()) => driver.subscribe().await,
            Err(e) => Err(e),
        };

        match attempt {
            Ok(events) => {
                info!(worker = %worker, "Lobby driver session established");
                return Ok(events);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > retry.max_attempts {
                    error!(
                        worker = %worker,
                        "Failed to connect lobby driver after {} attempts: {}",
                        retry.max_attempts, e
                    );
                    return Err(LadderError::Driver {
                        message: format!("Max retries exceeded: {}", e),
                    }
                    .into());
                }

                warn!(
                    worker = %worker,
                    "Lobby driver connection attempt {} failed: {}. Retrying in {:?}",
                    retry_count, e, delay
                );
                sleep(delay).await;
                delay = (delay * 2).min(retry.max_delay);
            }
        }
    }
}

#[derive(Debug)]
struct LobbyContext {
    state: WorkerState,
    connected: bool,
    settings: LobbySettings,
    queue: Option<LadderQueue>,
    split: Option<TeamSplit>,
    candidates: Option<BalanceResult>,
    candidate: usize,
    countdown: Option<JoinHandle<()>>,
    members: usize,
}

struct LobbyWorker {
    id: WorkerId,
    driver: Arc<dyn LobbyDriver>,
    deps: WorkerDeps,
    retry: RetryPolicy,
    ctx: LobbyContext,
    inbox: mpsc::Sender<WorkerMessage>,
    status: watch::Sender<WorkerStatus>,
}

/// Start a worker task and return its handle
pub fn spawn(
    id: impl Into<WorkerId>,
    driver: Arc<dyn LobbyDriver>,
    deps: WorkerDeps,
    settings: LobbySettings,
    retry: RetryPolicy,
    shutdown: broadcast::Receiver<()>,
) -> WorkerHandle {
    let id = id.into();
    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
    let (status_tx, status_rx) = watch::channel(WorkerStatus::idle(id.clone()));

    let worker = LobbyWorker {
        id: id.clone(),
        driver,
        deps,
        retry,
        ctx: LobbyContext {
            state: WorkerState::Idle,
            connected: false,
            settings,
            queue: None,
            split: None,
            candidates: None,
            candidate: 0,
            countdown: None,
            members: 0,
        },
        inbox: inbox_tx.clone(),
        status: status_tx,
    };
    tokio::spawn(worker.run(inbox_rx, shutdown));

    WorkerHandle {
        id,
        inbox: inbox_tx,
        status: status_rx,
    }
}

impl LobbyWorker {
    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<WorkerMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(worker = %self.id, "Lobby worker starting");

        'session: loop {
            let mut events = tokio::select! {
                _ = shutdown.recv() => break 'session,
                events = self.establish_session() => events,
            };

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => break 'session,
                    event = events.recv() => match event {
                        Some(LobbyEvent::Disconnected) | None => {
                            warn!(worker = %self.id, "Lobby driver session lost");
                            self.ctx.connected = false;
                            self.publish();
                            continue 'session;
                        }
                        Some(event) => self.handle_event(event).await,
                    },
                    message = inbox.recv() => match message {
                        Some(WorkerMessage::Shutdown) | None => break 'session,
                        Some(message) => self.handle_message(message).await,
                    },
                }
            }
        }

        self.cancel_countdown();
        if self.ctx.connected {
            if let Err(e) = self.driver.destroy_lobby().await {
                warn!(worker = %self.id, "Failed to destroy lobby on shutdown: {}", e);
            }
        }
        self.ctx.connected = false;
        self.ctx.state = WorkerState::Idle;
        self.publish();
        info!(worker = %self.id, "Lobby worker stopped");
    }

    /// Connect, then open a lobby unless a game is still running
    async fn establish_session(&mut self) -> mpsc::UnboundedReceiver<LobbyEvent> {
        loop {
            match connect_with_retry(self.driver.as_ref(), &self.retry, &self.id).await {
                Ok(events) => {
                    self.ctx.connected = true;
                    self.deps.metrics.record_reconnect(true);
                    if self.ctx.state == WorkerState::InGame {
                        self.publish();
                        return events;
                    }
                    match self.open_new_lobby().await {
                        Ok(()) => return events,
                        Err(e) => {
                            error!(worker = %self.id, "Failed to create lobby: {}", e);
                            self.ctx.connected = false;
                        }
                    }
                }
                Err(e) => {
                    error!(worker = %self.id, "Lobby driver unavailable: {}", e);
                    self.deps.metrics.record_reconnect(false);
                }
            }
            self.publish();
            sleep(self.retry.max_delay).await;
        }
    }

    async fn open_new_lobby(&mut self) -> Result<()> {
        self.cancel_countdown();
        self.ctx.split = None;
        self.ctx.candidates = None;
        self.ctx.candidate = 0;
        self.ctx.members = 0;
        self.set_state(WorkerState::Configuring);

        self.driver
            .create_lobby(&LobbyOptions::from(&self.ctx.settings))
            .await?;
        debug!(worker = %self.id, "Lobby requested");
        Ok(())
    }

    fn snapshot(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id.clone(),
            state: self.ctx.state,
            connected: self.ctx.connected,
            queue_id: self.ctx.queue.as_ref().map(|q| q.id),
            balanced: self.ctx.split.is_some(),
            members: self.ctx.members,
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn set_state(&mut self, state: WorkerState) {
        if self.ctx.state != state {
            debug!(worker = %self.id, "State {} -> {}", self.ctx.state, state);
            self.ctx.state = state;
        }
        self.publish();
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.ctx.countdown.take() {
            countdown.abort();
        }
    }

    fn clear_balance(&mut self) {
        self.cancel_countdown();
        self.ctx.split = None;
        self.ctx.candidates = None;
        self.ctx.candidate = 0;
    }

    async fn say(&self, lines: &[String]) {
        for line in lines {
            if let Err(e) = self.driver.send_message(line).await {
                warn!(worker = %self.id, "Failed to send lobby message: {}", e);
            }
        }
    }

    async fn handle_event(&mut self, event: LobbyEvent) {
        match event {
            LobbyEvent::LobbyCreated => {
                if self.ctx.state == WorkerState::Configuring {
                    info!(worker = %self.id, "Lobby is open");
                    self.set_state(WorkerState::Open);
                    if let Some(queue) = &self.ctx.queue {
                        let line = format!("This lobby is reserved for queue {}", queue.id);
                        self.say(&[line]).await;
                    }
                    self.enforce().await;
                }
            }
            LobbyEvent::MembersChanged => {
                if self.ctx.state == WorkerState::Open {
                    self.enforce().await;
                }
            }
            LobbyEvent::StateChanged(LobbyState::Run) => {
                if self.ctx.state == WorkerState::Open {
                    warn!(worker = %self.id, "Game was launched outside of the start command");
                    self.cancel_countdown();
                    self.set_state(WorkerState::InGame);
                }
            }
            LobbyEvent::StateChanged(LobbyState::PostGame) => {
                if matches!(self.ctx.state, WorkerState::InGame | WorkerState::Open) {
                    self.finish_game().await;
                }
            }
            LobbyEvent::StateChanged(_) => {}
            LobbyEvent::ChatMessage { account_id, text } => {
                self.handle_chat(account_id, &text).await;
            }
            LobbyEvent::Disconnected => {}
        }
    }

    async fn handle_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Command(command, reply) => {
                let result = self.execute(command).await;
                // The caller may have timed out
                let _ = reply.send(result);
            }
            WorkerMessage::Bind(queue) => self.bind(queue).await,
            WorkerMessage::Refresh(queue) => self.refresh(queue).await,
            WorkerMessage::Unbind => self.unbind().await,
            WorkerMessage::CountdownElapsed => self.countdown_elapsed().await,
            WorkerMessage::Shutdown => {}
        }
    }

    async fn bind(&mut self, queue: LadderQueue) {
        if self.ctx.state == WorkerState::InGame {
            warn!(worker = %self.id, "Ignoring queue {} while in game", queue.id);
            return;
        }
        info!(worker = %self.id, queue_id = %queue.id, "Bound to queue");

        self.clear_balance();
        if queue.is_full() {
            self.ctx.split = queue.proposed.clone();
        }
        let line = format!("This lobby is reserved for queue {}", queue.id);
        self.ctx.queue = Some(queue);
        self.publish();

        if self.ctx.state == WorkerState::Open {
            self.say(&[line]).await;
            self.enforce().await;
        }
    }

    async fn refresh(&mut self, queue: LadderQueue) {
        if self.ctx.queue.as_ref().map(|q| q.id) != Some(queue.id) {
            return;
        }
        if self.ctx.state != WorkerState::InGame {
            if !queue.is_full() {
                self.clear_balance();
            } else if self.ctx.split.is_none() {
                self.ctx.split = queue.proposed.clone();
            }
        }
        self.ctx.queue = Some(queue);
        self.publish();

        if self.ctx.state == WorkerState::Open {
            self.enforce().await;
        }
    }

    async fn unbind(&mut self) {
        if self.ctx.state == WorkerState::InGame {
            return;
        }
        let Some(queue) = self.ctx.queue.take() else {
            return;
        };
        info!(worker = %self.id, queue_id = %queue.id, "Released queue");

        self.clear_balance();
        if self.ctx.connected {
            if let Err(e) = self.open_new_lobby().await {
                error!(worker = %self.id, "Failed to reset lobby: {}", e);
            }
        }
        self.publish();
    }

    async fn players_by_account(
        &self,
        members: &[LobbyMember],
    ) -> Result<HashMap<AccountId, Player>> {
        let mut players = HashMap::new();
        for member in members {
            if let Some(player) = self.deps.store.find_by_account(member.account_id)? {
                players.insert(member.account_id, player);
            }
        }
        Ok(players)
    }

    async fn enforce(&mut self) {
        if let Err(e) = self.try_enforce().await {
            warn!(worker = %self.id, "Enforcement pass failed: {}", e);
        }
    }

    async fn try_enforce(&mut self) -> Result<()> {
        let members = self.driver.members().await?;
        self.ctx.members = members.len();
        let players = self.players_by_account(&members).await?;

        let kicks = plan_kicks(
            &members,
            &players,
            Policy {
                settings: &self.ctx.settings,
                queue: self.ctx.queue.as_ref(),
                split: self.ctx.split.as_ref(),
            },
        );

        for kick in kicks {
            info!(worker = %self.id, "Kicking {} ({})", kick.name, kick.reason);
            if kick.from_lobby {
                self.driver.kick(kick.account_id).await?;
            } else {
                self.driver.kick_from_team(kick.account_id).await?;
            }
            self.deps.metrics.record_kick(kick.reason.label());
        }

        self.publish();
        Ok(())
    }

    async fn handle_chat(&mut self, account_id: AccountId, text: &str) {
        let Some(parsed) = chat::parse(text) else {
            return;
        };

        let reply = match parsed {
            Err(usage) => CommandReply::Refused(usage),
            Ok(command) => {
                let staff = matches!(
                    self.deps.store.find_by_account(account_id),
                    Ok(Some(ref player)) if player.bot_access
                );
                if command.staff_only && !staff {
                    CommandReply::Refused(format!("!{} is for staff only.", command.name))
                } else {
                    self.execute(command.command)
                        .await
                        .unwrap_or_else(|e| CommandReply::Refused(e.to_string()))
                }
            }
        };

        self.say(&chat::format_reply(&reply)).await;
    }

    async fn execute(
        &mut self,
        command: WorkerCommand,
    ) -> std::result::Result<CommandReply, LadderError> {
        let name = command.name();
        let result = self
            .dispatch(command)
            .await
            .map_err(|e| LadderError::from_anyhow(&e));

        let accepted = matches!(&result, Ok(reply) if !reply.is_refusal());
        self.deps.metrics.record_command(name, accepted);
        self.publish();
        result
    }

    async fn dispatch(&mut self, command: WorkerCommand) -> Result<CommandReply> {
        if command == WorkerCommand::Status {
            return Ok(CommandReply::Status(self.snapshot()));
        }
        if self.ctx.state != WorkerState::Open {
            return Ok(CommandReply::Refused(format!(
                "Lobby is {}, commands wait until it is open.",
                self.ctx.state
            )));
        }

        match command {
            WorkerCommand::Balance => self.balance_lobby().await,
            WorkerCommand::Rebalance(index) => {
                let Some(candidates) = &self.ctx.candidates else {
                    return Ok(CommandReply::Refused("Please balance teams first.".to_string()));
                };
                let split = candidates.candidate(index)?.clone();
                self.ctx.split = Some(split.clone());
                self.ctx.candidate = index;
                self.enforce().await;
                Ok(CommandReply::Balanced {
                    split,
                    candidate: index,
                })
            }
            WorkerCommand::ClearBalance => {
                self.clear_balance();
                self.enforce().await;
                Ok(CommandReply::BalanceCleared)
            }
            WorkerCommand::Swap(first, second) => self.swap(&first, &second).await,
            WorkerCommand::Start => self.start(false).await,
            WorkerCommand::ForceStart => self.start(true).await,
            WorkerCommand::SetMinRating(rating) => {
                self.ctx.settings.min_rating = rating;
                self.enforce().await;
                Ok(CommandReply::Updated(format!("Minimum rating set to {}.", rating)))
            }
            WorkerCommand::SetRegion(region) => {
                self.ctx.settings.region = region;
                self.driver
                    .set_options(&LobbyOptions::from(&self.ctx.settings))
                    .await?;
                Ok(CommandReply::Updated(format!("Server region set to {}.", region)))
            }
            WorkerCommand::SetMode(mode) => {
                self.ctx.settings.mode = mode;
                self.driver
                    .set_options(&LobbyOptions::from(&self.ctx.settings))
                    .await?;
                Ok(CommandReply::Updated(format!("Game mode set to {}.", mode)))
            }
            WorkerCommand::SetVoiceRequired(on) => {
                self.ctx.settings.voice_required = on;
                self.enforce().await;
                Ok(CommandReply::Updated(format!(
                    "Voice requirement {}.",
                    if on { "on" } else { "off" }
                )))
            }
            WorkerCommand::SetStaffOnly(on) => {
                self.ctx.settings.staff_only = on;
                self.enforce().await;
                Ok(CommandReply::Updated(format!(
                    "Staff only mode {}.",
                    if on { "on" } else { "off" }
                )))
            }
            WorkerCommand::Status => Ok(CommandReply::Status(self.snapshot())),
        }
    }

    /// Roster for balancing: the full bound queue, else the seated members
    async fn roster(&self) -> Result<std::result::Result<Vec<BalancePlayer>, String>> {
        let roster_size = self.deps.balancer.config().roster_size();

        if let Some(queue) = self.ctx.queue.as_ref().filter(|q| q.is_full()) {
            let mut roster = Vec::with_capacity(queue.len());
            for player_id in queue.player_ids() {
                let player = self.deps.store.get_player(&player_id)?.ok_or_else(|| {
                    LadderError::PlayerNotFound {
                        player: player_id.clone(),
                    }
                })?;
                roster.push(BalancePlayer::from(&player));
            }
            return Ok(Ok(roster));
        }

        let members = self.driver.members().await?;
        let seated: Vec<&LobbyMember> = members
            .iter()
            .filter(|m| m.slot.team_index().is_some())
            .collect();
        if seated.len() != roster_size {
            return Ok(Err(format!(
                "We need {} players in team slots, found {}.",
                roster_size,
                seated.len()
            )));
        }

        let players = self.players_by_account(&members).await?;
        let unknown: Vec<&str> = seated
            .iter()
            .filter(|m| !players.contains_key(&m.account_id))
            .map(|m| m.name.as_str())
            .collect();
        if !unknown.is_empty() {
            return Ok(Err(format!(
                "I don't know these players: {}",
                unknown.join(", ")
            )));
        }

        Ok(Ok(seated
            .iter()
            .filter_map(|m| players.get(&m.account_id))
            .map(BalancePlayer::from)
            .collect()))
    }

    async fn balance_lobby(&mut self) -> Result<CommandReply> {
        let roster = match self.roster().await? {
            Ok(roster) => roster,
            Err(reason) => return Ok(CommandReply::Refused(reason)),
        };

        let timer = self.deps.metrics.start_timer();
        let result = self.deps.balancer.balance(roster);
        let mode = if self.deps.balancer.config().role_balancing {
            "roles"
        } else {
            "rating"
        };
        self.deps.metrics.record_balance(
            mode,
            result.as_ref().map_or(0, |r| r.len()),
            timer.stop(),
            result.is_ok(),
        );

        let result = result?;
        let split = result.candidate(0)?.clone();
        info!(
            worker = %self.id,
            "Balanced lobby, {} candidates, rating difference {:.0}",
            result.len(),
            split.mmr_diff
        );

        self.ctx.split = Some(split.clone());
        self.ctx.candidates = Some(result);
        self.ctx.candidate = 0;
        self.enforce().await;

        Ok(CommandReply::Balanced {
            split,
            candidate: 0,
        })
    }

    async fn swap(&mut self, first: &str, second: &str) -> Result<CommandReply> {
        let Some(split) = &self.ctx.split else {
            return Ok(CommandReply::Refused("Please balance teams first.".to_string()));
        };

        let resolve = |name: &str| -> Result<Player> {
            self.deps
                .store
                .find_by_name(name)?
                .ok_or_else(|| {
                    LadderError::PlayerNotFound {
                        player: name.to_string(),
                    }
                    .into()
                })
        };
        let first = resolve(first)?;
        let second = resolve(second)?;

        let swapped = split.swap_players(&first.id, &second.id, self.deps.balancer.config())?;
        info!(worker = %self.id, "Swapped {} and {}", first.name, second.name);

        self.ctx.split = Some(swapped.clone());
        self.enforce().await;
        Ok(CommandReply::Balanced {
            split: swapped,
            candidate: self.ctx.candidate,
        })
    }

    /// Compare seats with the stored split, fixing a mirrored orientation
    async fn seat_check(&mut self) -> Result<Option<TeamCheck>> {
        let Some(split) = &self.ctx.split else {
            return Ok(None);
        };
        let members = self.driver.members().await?;
        let players = self.players_by_account(&members).await?;

        let check = check_teams(&members, &players, split);
        if check == TeamCheck::Mirrored {
            if let Some(split) = self.ctx.split.as_mut() {
                split.swap_sides();
            }
            debug!(worker = %self.id, "Teams sit mirrored, swapped stored sides");
        }
        Ok(Some(check))
    }

    async fn start(&mut self, force: bool) -> Result<CommandReply> {
        if self.ctx.split.is_none() && !force {
            match self.balance_lobby().await? {
                CommandReply::Balanced { .. } => {}
                CommandReply::Refused(reason) => {
                    return Ok(CommandReply::Refused(format!(
                        "Please balance teams first. {}",
                        reason
                    )))
                }
                other => return Ok(other),
            }
        }

        if let Some(TeamCheck::Mismatch { must_move }) = self.seat_check().await? {
            if !force {
                return Ok(CommandReply::MustMove(must_move));
            }
            warn!(worker = %self.id, "Force start with teams off balance, result will not be recorded");
            self.clear_balance();
        }

        let countdown = self.ctx.settings.start_countdown_seconds;
        if countdown > 0 && !force {
            let countdown = Duration::from_secs(countdown);
            self.schedule_countdown(countdown);
            return Ok(CommandReply::Starting { countdown });
        }

        self.launch().await?;
        Ok(CommandReply::Launched {
            balanced: self.ctx.split.is_some(),
        })
    }

    fn schedule_countdown(&mut self, countdown: Duration) {
        self.cancel_countdown();
        let inbox = self.inbox.clone();
        self.ctx.countdown = Some(tokio::spawn(async move {
            sleep(countdown).await;
            let _ = inbox.send(WorkerMessage::CountdownElapsed).await;
        }));
    }

    async fn countdown_elapsed(&mut self) {
        self.ctx.countdown = None;
        if self.ctx.state != WorkerState::Open || self.ctx.split.is_none() {
            return;
        }

        let reply = match self.seat_check().await {
            Ok(Some(TeamCheck::Mismatch { must_move })) => CommandReply::MustMove(must_move),
            Ok(_) => match self.launch().await {
                Ok(()) => CommandReply::Launched { balanced: true },
                Err(e) => CommandReply::Refused(format!("Launch failed: {}", e)),
            },
            Err(e) => CommandReply::Refused(format!("Launch failed: {}", e)),
        };
        self.say(&chat::format_reply(&reply)).await;
    }

    async fn launch(&mut self) -> Result<()> {
        self.cancel_countdown();
        self.driver.launch().await?;
        self.set_state(WorkerState::InGame);

        if let Some(queue) = &self.ctx.queue {
            self.deps.store.mark_queue_started(queue.id)?;
        }
        self.deps.metrics.record_game_started();
        info!(
            worker = %self.id,
            balanced = self.ctx.split.is_some(),
            "Game launched"
        );
        Ok(())
    }

    async fn finish_game(&mut self) {
        self.set_state(WorkerState::PostGame);

        let outcome = match self.driver.outcome().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(worker = %self.id, "Could not read game outcome: {}", e);
                crate::types::MatchOutcome::NotScored
            }
        };
        let external_id = self.driver.match_id().await.ok().flatten();

        match (self.ctx.split.take(), outcome.winner_index()) {
            (Some(split), Some(winner)) => {
                match self.deps.recorder.record(&split, winner, external_id) {
                    Ok((record, changes)) => {
                        self.deps.metrics.record_match_recorded(changes.len());
                        info!(worker = %self.id, match_id = %record.id, "Match recorded");
                        self.say(&[format!("Match recorded, team {} won.", winner + 1)])
                            .await;
                    }
                    Err(e) => {
                        self.deps.metrics.record_recording_failure();
                        error!(worker = %self.id, "Failed to record match: {}", e);
                        self.say(&["Match could not be recorded.".to_string()])
                            .await;
                    }
                }
            }
            (Some(_), None) => {
                warn!(worker = %self.id, "Game ended without a result, not recording");
            }
            (None, _) => {
                info!(worker = %self.id, "Unbalanced game ended, not recording");
            }
        }

        if let Some(queue) = self.ctx.queue.take() {
            if let Err(e) = self.deps.store.close_queue(queue.id) {
                warn!(worker = %self.id, "Failed to close queue {}: {}", queue.id, e);
            }
        }

        if let Err(e) = self.open_new_lobby().await {
            error!(worker = %self.id, "Failed to open a new lobby: {}", e);
        }
    }
}

/// Cloneable handle to a worker task
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    inbox: mpsc::Sender<WorkerMessage>,
    status: watch::Receiver<WorkerStatus>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest published status
    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    fn unavailable(&self) -> LadderError {
        LadderError::WorkerUnavailable {
            worker_id: self.id.clone(),
        }
    }

    async fn send(&self, message: WorkerMessage) -> std::result::Result<(), LadderError> {
        self.inbox
            .send(message)
            .await
            .map_err(|_| self.unavailable())
    }

    /// Run a command and wait for its reply
    pub async fn command(
        &self,
        command: WorkerCommand,
    ) -> std::result::Result<CommandReply, LadderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(WorkerMessage::Command(command, reply_tx)).await?;

        match timeout(COMMAND_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            _ => Err(self.unavailable()),
        }
    }

    pub async fn bind(&self, queue: LadderQueue) -> std::result::Result<(), LadderError> {
        self.send(WorkerMessage::Bind(queue)).await
    }

    pub async fn refresh(&self, queue: LadderQueue) -> std::result::Result<(), LadderError> {
        self.send(WorkerMessage::Refresh(queue)).await
    }

    pub async fn unbind(&self) -> std::result::Result<(), LadderError> {
        self.send(WorkerMessage::Unbind).await
    }

    pub async fn shutdown(&self) -> std::result::Result<(), LadderError> {
        self.send(WorkerMessage::Shutdown).await
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&WorkerStatus) -> bool,
        limit: Duration,
    ) -> std::result::Result<WorkerStatus, LadderError> {
        let mut status = self.status.clone();
        let waited = timeout(limit, async move {
            let seen = status.wait_for(predicate).await.map(|s| s.clone());
            seen
        })
        .await;

        match waited {
            Ok(Ok(status)) => Ok(status),
            _ => Err(self.unavailable()),
        }
    }
}
