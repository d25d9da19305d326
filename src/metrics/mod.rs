//! Metrics and monitoring for the ladder service
//!
//! Prometheus counters and gauges for balancing, rating, scheduling and the
//! lobby workers, plus the HTTP server exposing them.

pub mod collector;
pub mod health;

pub use collector::{
    BalancerMetrics, MetricsCollector, MetricsTimer, RatingMetrics, SchedulerMetrics,
    ServiceMetrics, WorkerMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
