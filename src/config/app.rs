//! Main application configuration
//!
//! This module defines the primary configuration structures for the ladder
//! service, including environment variable and TOML file loading and validation.

use crate::config::{BalancerConfig, LobbySettings, RatingConfig};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub balancer: BalancerConfig,
    pub rating: RatingConfig,
    #[serde(default)]
    pub lobby: LobbySettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Reconciliation loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Interval between reconciliation passes
    pub tick_interval_seconds: u64,
    /// Interval between AFK watchdog sweeps
    pub afk_check_interval_seconds: u64,
    /// Queue members idle longer than this are dropped from unfilled queues
    pub afk_limit_seconds: u64,
}

/// Lobby driver session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Number of lobby workers (one per bot credential)
    pub worker_count: usize,
    /// Credential prefix, worker `i` logs in as `<prefix><i>`
    pub login_prefix: String,
    /// Maximum reconnect attempts before a worker gives up
    pub max_retry_attempts: u32,
    /// Base reconnect delay in milliseconds, doubled per attempt
    pub retry_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            scheduler: SchedulerSettings::default(),
            driver: DriverSettings::default(),
            balancer: BalancerConfig::default(),
            rating: RatingConfig::with_clamping(false),
            lobby: LobbySettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "inhouse-ladder".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 5,
            afk_check_interval_seconds: 60,
            afk_limit_seconds: 3600,
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            worker_count: 1,
            login_prefix: "ladder_bot".to_string(),
            max_retry_attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

/// Parse an environment variable into `target` if it is set
fn env_override<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = env::var(key) {
        *target = raw
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", key, raw))?;
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        env_override("SERVICE_NAME", &mut config.service.name)?;
        env_override("LOG_LEVEL", &mut config.service.log_level)?;
        env_override("HEALTH_PORT", &mut config.service.health_port)?;
        env_override(
            "SHUTDOWN_TIMEOUT_SECONDS",
            &mut config.service.shutdown_timeout_seconds,
        )?;

        // Scheduler settings
        env_override(
            "TICK_INTERVAL_SECONDS",
            &mut config.scheduler.tick_interval_seconds,
        )?;
        env_override("AFK_LIMIT_SECONDS", &mut config.scheduler.afk_limit_seconds)?;

        // Driver settings
        env_override("WORKER_COUNT", &mut config.driver.worker_count)?;
        env_override("BOT_LOGIN", &mut config.driver.login_prefix)?;
        env_override(
            "DRIVER_MAX_RETRY_ATTEMPTS",
            &mut config.driver.max_retry_attempts,
        )?;
        env_override("DRIVER_RETRY_DELAY_MS", &mut config.driver.retry_delay_ms)?;

        // Balancer settings
        env_override("MMR_EXPONENT", &mut config.balancer.mmr_exponent)?;
        env_override("ROLE_BALANCING", &mut config.balancer.role_balancing)?;
        env_override("ROLE_MMR_CEILING", &mut config.balancer.role_mmr_ceiling)?;

        // Rating settings
        env_override("MMR_PER_GAME", &mut config.rating.mmr_per_game)?;
        env_override(
            "CLAMP_TO_BOUNDARIES",
            &mut config.rating.clamp_to_boundaries,
        )?;

        // Lobby settings
        env_override("LOBBY_PASSWORD", &mut config.lobby.password)?;
        env_override("LOBBY_MIN_RATING", &mut config.lobby.min_rating)?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get reconciliation interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_seconds)
    }

    /// Get AFK sweep interval as Duration
    pub fn afk_check_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.afk_check_interval_seconds)
    }

    /// Get driver retry delay as Duration
    pub fn driver_retry_delay(&self) -> Duration {
        Duration::from_millis(self.driver.retry_delay_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.scheduler.tick_interval_seconds == 0 {
        return Err(anyhow!("Tick interval must be greater than 0"));
    }
    if config.scheduler.afk_check_interval_seconds == 0 {
        return Err(anyhow!("AFK check interval must be greater than 0"));
    }

    if config.driver.worker_count == 0 {
        return Err(anyhow!("Worker count must be greater than 0"));
    }

    if config.balancer.team_size == 0 {
        return Err(anyhow!("Team size must be greater than 0"));
    }
    if config.balancer.mmr_exponent < 1.0 {
        return Err(anyhow!(
            "MMR exponent must be at least 1, got {}",
            config.balancer.mmr_exponent
        ));
    }
    if config.balancer.role_mmr_ceiling < 0.0 {
        return Err(anyhow!("Role MMR ceiling cannot be negative"));
    }
    if config.balancer.role_balancing && config.balancer.team_size != 5 {
        return Err(anyhow!(
            "Role balancing needs teams of 5, got {}",
            config.balancer.team_size
        ));
    }

    if config.rating.underdog_step <= 0 {
        return Err(anyhow!("Underdog step must be positive"));
    }
    if config.rating.mmr_per_game < 0 || config.rating.underdog_cap < 0 {
        return Err(anyhow!("Rating constants cannot be negative"));
    }

    Ok(())
}
