//! Queue scheduler
//!
//! Periodically pairs active queues with free lobby workers and releases
//! workers whose queue is gone.

pub mod reconcile;
pub mod runner;

pub use reconcile::{plan, ReconcilePlan};
pub use runner::{Scheduler, TickSummary};
