//! Ladder ratings
//!
//! This module turns match results into score changes, records matches
//! atomically and provides the storage interface for players, queues and
//! the score ledger.

pub mod calculator;
pub mod recorder;
pub mod storage;

// Re-export commonly used types
pub use calculator::{RatingUpdater, ScoreChange, ScoringContext};
pub use recorder::{Match, MatchPlayer, MatchRecorder};
pub use storage::{InMemoryLadderStore, LadderSettings, LadderStore};
