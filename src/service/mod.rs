//! Service layer for the ladder
//!
//! Application state, startup and shutdown of the background tasks, and
//! health check aggregation.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthStatus, ServiceStats};
