//! Lobby worker configuration

use crate::types::{GameMode, Rating, Region};
use serde::{Deserialize, Serialize};

/// Options every fresh lobby is created with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    pub name: String,
    pub password: String,
    pub region: Region,
    pub mode: GameMode,
    /// Minimum ladder rating for team slots in direct-join lobbies
    pub min_rating: Rating,
    pub voice_required: bool,
    pub staff_only: bool,
    /// Delay between an accepted start and the actual launch
    pub start_countdown_seconds: u64,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            name: "Inhouse Ladder".to_string(),
            password: String::new(),
            region: Region::Europe,
            mode: GameMode::CaptainsMode,
            min_rating: 0,
            voice_required: false,
            staff_only: false,
            start_countdown_seconds: 0,
        }
    }
}
