//! Team balancer configuration

use serde::{Deserialize, Serialize};

/// Tuning knobs for the team balancer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Players per team; a roster holds twice as many
    pub team_size: usize,
    /// Exponent applied to ratings before averaging (`e >= 1`)
    pub mmr_exponent: f64,
    /// Search role assignments and rank by role fit first
    pub role_balancing: bool,
    /// Largest team average difference allowed while role balancing
    pub role_mmr_ceiling: f64,
    /// How far below the team's best player a carry or mid may be
    pub core_role_max_gap: i32,
}

impl BalancerConfig {
    pub fn roster_size(&self) -> usize {
        self.team_size * 2
    }

    pub fn with_role_balancing(mut self) -> Self {
        self.role_balancing = true;
        self
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            team_size: 5,
            mmr_exponent: 3.0,
            role_balancing: false,
            role_mmr_ceiling: 200.0,
            core_role_max_gap: 1500,
        }
    }
}
