//! Team balancing
//!
//! Splits a roster of `2k` players into two teams, scoring every admissible
//! partition by average and exponent-weighted average rating, with optional
//! positional role assignment.

pub mod roles;
pub mod search;
pub mod team;

// Re-export commonly used types
pub use roles::{assign_roles, best_assignment, RoleAssignment};
pub use search::{BalanceResult, Balancer};
pub use team::{balance_from_teams, BalancePlayer, Team, TeamSplit, TeamStats};
