//! Configuration management for the ladder service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values for every component.

pub mod app;
pub mod balancer;
pub mod lobby;
pub mod rating;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, DriverSettings, SchedulerSettings, ServiceSettings};
pub use balancer::BalancerConfig;
pub use lobby::LobbySettings;
pub use rating::RatingConfig;
