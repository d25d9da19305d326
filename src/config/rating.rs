//! Rating updater configuration

use serde::{Deserialize, Serialize};

fn default_mmr_per_game() -> i32 {
    50
}

fn default_underdog_cap() -> i32 {
    15
}

fn default_underdog_step() -> i32 {
    300
}

fn default_underdog_unit() -> i32 {
    15
}

fn default_initial_score() -> i32 {
    25
}

/// Constants of the rating update step.
///
/// `clamp_to_boundaries` has no serde default: a configuration file must
/// state whether per-player rating bands are enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingConfig {
    #[serde(default = "default_mmr_per_game")]
    pub mmr_per_game: i32,
    #[serde(default = "default_underdog_cap")]
    pub underdog_cap: i32,
    #[serde(default = "default_underdog_step")]
    pub underdog_step: i32,
    #[serde(default = "default_underdog_unit")]
    pub underdog_unit: i32,
    pub clamp_to_boundaries: bool,
    /// Score granted when a player is seeded into a season
    #[serde(default = "default_initial_score")]
    pub initial_score: i32,
}

impl RatingConfig {
    /// Reference constants with an explicit clamping choice
    pub fn with_clamping(clamp_to_boundaries: bool) -> Self {
        Self {
            mmr_per_game: default_mmr_per_game(),
            underdog_cap: default_underdog_cap(),
            underdog_step: default_underdog_step(),
            underdog_unit: default_underdog_unit(),
            clamp_to_boundaries,
            initial_score: default_initial_score(),
        }
    }
}
