//! Common types used throughout the ladder service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for registered players
pub type PlayerId = String;

/// Game account id, the identity the lobby driver reports for members
pub type AccountId = u64;

/// Unique identifier for queues
pub type QueueId = Uuid;

/// Unique identifier for queue channels
pub type ChannelId = Uuid;

/// Unique identifier for recorded matches
pub type MatchId = Uuid;

/// Identifier of a lobby worker (one per bot credential)
pub type WorkerId = String;

/// Ladder rating points
pub type Rating = i32;

/// Positional roles, in draft order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Carry,
    Mid,
    Offlane,
    Pos4,
    Pos5,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Carry, Role::Mid, Role::Offlane, Role::Pos4, Role::Pos5];

    /// Core roles are the ones that must not go to a far weaker player
    pub fn is_core(self) -> bool {
        matches!(self, Role::Carry | Role::Mid)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Carry => write!(f, "carry"),
            Role::Mid => write!(f, "mid"),
            Role::Offlane => write!(f, "offlane"),
            Role::Pos4 => write!(f, "pos4"),
            Role::Pos5 => write!(f, "pos5"),
        }
    }
}

/// Per-role comfort scores, 1 (worst) to 5 (best)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleScores {
    pub carry: u8,
    pub mid: u8,
    pub offlane: u8,
    pub pos4: u8,
    pub pos5: u8,
}

impl RoleScores {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build scores in `Role::ALL` order, clamping each into 1..=5
    pub fn new(scores: [u8; 5]) -> Self {
        let clamp = |v: u8| v.clamp(Self::MIN, Self::MAX);
        Self {
            carry: clamp(scores[0]),
            mid: clamp(scores[1]),
            offlane: clamp(scores[2]),
            pos4: clamp(scores[3]),
            pos5: clamp(scores[4]),
        }
    }

    pub fn get(&self, role: Role) -> u8 {
        match role {
            Role::Carry => self.carry,
            Role::Mid => self.mid,
            Role::Offlane => self.offlane,
            Role::Pos4 => self.pos4,
            Role::Pos5 => self.pos5,
        }
    }
}

impl Default for RoleScores {
    fn default() -> Self {
        Self::new([3; 5])
    }
}

/// Ban levels a player can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BanLevel {
    /// May sit in the lobby but not in a team slot
    Playing,
    /// May not be in the lobby at all
    PlayingAndLobby,
}

/// A registered ladder player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub account_id: Option<AccountId>,
    pub discord_id: Option<String>,
    /// External reference rating
    pub dota_mmr: Rating,
    /// Ladder rating, cached sum of this season's score changes
    pub ladder_mmr: Rating,
    pub score: i32,
    pub rank_ladder_mmr: u32,
    pub rank_score: u32,
    pub roles: RoleScores,
    pub banned: Option<BanLevel>,
    pub vouched: bool,
    pub voice_issues: bool,
    /// Staff access to administrative commands
    pub bot_access: bool,
    /// Rating band, inactive while `max_allowed_mmr` is 0
    pub min_allowed_mmr: Rating,
    pub max_allowed_mmr: Rating,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn is_banned_from_lobby(&self) -> bool {
        self.banned == Some(BanLevel::PlayingAndLobby)
    }

    pub fn is_banned_from_playing(&self) -> bool {
        self.banned.is_some()
    }

    /// Rating band if one has been set for this player
    pub fn rating_bounds(&self) -> Option<(Rating, Rating)> {
        if self.max_allowed_mmr > 0 {
            Some((self.min_allowed_mmr, self.max_allowed_mmr))
        } else {
            None
        }
    }
}

/// Registration request for a new player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    pub dota_mmr: Rating,
    pub account_id: Option<AccountId>,
    pub discord_id: Option<String>,
    pub roles: RoleScores,
}

/// Team slot a lobby member occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbySlot {
    Radiant,
    Dire,
    Unassigned,
    Spectator,
}

impl LobbySlot {
    /// Team index used by balance results: radiant is 0, dire is 1
    pub fn team_index(self) -> Option<usize> {
        match self {
            LobbySlot::Radiant => Some(0),
            LobbySlot::Dire => Some(1),
            LobbySlot::Unassigned | LobbySlot::Spectator => None,
        }
    }
}

/// One member of a live game lobby as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub account_id: AccountId,
    pub name: String,
    pub slot: LobbySlot,
}

/// Terminal outcome of a lobby game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    RadiantVictory,
    DireVictory,
    NotScored,
}

impl MatchOutcome {
    pub fn winner_index(self) -> Option<usize> {
        match self {
            MatchOutcome::RadiantVictory => Some(0),
            MatchOutcome::DireVictory => Some(1),
            MatchOutcome::NotScored => None,
        }
    }
}

/// Server region for a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Europe,
    EuropeEast,
    UsEast,
    UsWest,
    Russia,
    SouthAmerica,
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eu" | "euw" | "europe" => Ok(Region::Europe),
            "eue" | "europe_east" => Ok(Region::EuropeEast),
            "use" | "us_east" => Ok(Region::UsEast),
            "usw" | "us_west" => Ok(Region::UsWest),
            "ru" | "russia" => Ok(Region::Russia),
            "sa" | "south_america" => Ok(Region::SouthAmerica),
            other => Err(format!("unknown region '{}'", other)),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Europe => "Europe",
            Region::EuropeEast => "Europe East",
            Region::UsEast => "US East",
            Region::UsWest => "US West",
            Region::Russia => "Russia",
            Region::SouthAmerica => "South America",
        };
        write!(f, "{}", name)
    }
}

/// Game mode for a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    CaptainsDraft,
    CaptainsMode,
    AllPick,
    RandomDraft,
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cd" | "captains_draft" => Ok(GameMode::CaptainsDraft),
            "cm" | "captains_mode" => Ok(GameMode::CaptainsMode),
            "ap" | "all_pick" => Ok(GameMode::AllPick),
            "rd" | "random_draft" => Ok(GameMode::RandomDraft),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::CaptainsDraft => "Captains Draft",
            GameMode::CaptainsMode => "Captains Mode",
            GameMode::AllPick => "All Pick",
            GameMode::RandomDraft => "Random Draft",
        };
        write!(f, "{}", name)
    }
}
