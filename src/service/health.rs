//! Health checks
//!
//! Aggregates component checks for the ladder service: the service flag, the
//! ladder store, and the lobby workers' driver sessions.

use crate::lobby::WorkerState;
use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported to Prometheus
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Why the component is not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl ComponentCheck {
    fn new(name: &str, started: Instant, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Ladder statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub players: usize,
    pub active_queues: usize,
    pub players_queued: usize,
    pub matches_recorded: usize,
    pub workers: usize,
    pub workers_connected: usize,
    pub workers_in_game: usize,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Run every component check
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_store(&app_state),
            Self::check_workers(&app_state),
        ];
        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(&app_state),
        })
    }

    /// The process is up and has not begun shutting down
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// The service can pair queues with lobbies
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        let store = Self::check_store(&app_state).status;
        let workers = Self::check_workers(&app_state).status;
        Ok(store.worst(workers))
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let started = Instant::now();
        if app_state.is_running().await {
            ComponentCheck::new("service_running", started, HealthStatus::Healthy, None)
        } else {
            ComponentCheck::new(
                "service_running",
                started,
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        }
    }

    fn check_store(app_state: &AppState) -> ComponentCheck {
        let started = Instant::now();
        match app_state.store().active_queues() {
            Ok(_) => ComponentCheck::new("ladder_store", started, HealthStatus::Healthy, None),
            Err(e) => {
                error!("Ladder store check failed: {}", e);
                ComponentCheck::new(
                    "ladder_store",
                    started,
                    HealthStatus::Unhealthy,
                    Some(e.to_string()),
                )
            }
        }
    }

    /// Healthy with every session up, degraded with some, unhealthy with none
    fn check_workers(app_state: &AppState) -> ComponentCheck {
        let started = Instant::now();
        let statuses = app_state.worker_statuses();
        let connected = statuses.iter().filter(|s| s.connected).count();

        let (status, message) = if connected == statuses.len() && connected > 0 {
            (HealthStatus::Healthy, None)
        } else if connected > 0 {
            (
                HealthStatus::Degraded,
                Some(format!("{} of {} workers connected", connected, statuses.len())),
            )
        } else {
            (
                HealthStatus::Unhealthy,
                Some("No lobby worker is connected".to_string()),
            )
        };
        ComponentCheck::new("lobby_workers", started, status, message)
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let store = app_state.store();
        let queues = store.active_queues().unwrap_or_default();
        let statuses = app_state.worker_statuses();

        ServiceStats {
            players: store.list_players().map(|p| p.len()).unwrap_or(0),
            active_queues: queues.len(),
            players_queued: queues.iter().map(|q| q.len()).sum(),
            matches_recorded: store.list_matches().map(|m| m.len()).unwrap_or(0),
            workers: statuses.len(),
            workers_connected: statuses.iter().filter(|s| s.connected).count(),
            workers_in_game: statuses
                .iter()
                .filter(|s| s.state == WorkerState::InGame)
                .count(),
            uptime_seconds: app_state.uptime().as_secs(),
        }
    }
}
