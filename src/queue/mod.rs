//! Player queues
//!
//! Queue channels, queue admission rules and the AFK watchdog.

pub mod afk;
pub mod model;
pub mod service;

// Re-export commonly used types
pub use afk::AfkWatchdog;
pub use model::{LadderQueue, QueueChannel, QueueMember};
pub use service::{JoinOutcome, QueueService};
