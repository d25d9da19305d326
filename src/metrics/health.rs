//! Health check endpoints and Prometheus metrics server
//!
//! HTTP endpoints for liveness, readiness, Prometheus scraping and a JSON
//! view of queues and lobby workers, served with Axum.

use crate::lobby::WorkerStatus;
use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{ComponentCheck, HealthCheck, HealthStatus};
use crate::types::{QueueId, WorkerId};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE: &str = "inhouse-ladder";

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    /// Host to bind to, "0.0.0.0" for all interfaces
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub app_state: Option<Arc<AppState>>,
}

/// HTTP server for monitoring endpoints
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the application state that health checks inspect
    pub fn with_app_state(mut self, app_state: Arc<AppState>) -> Self {
        self.state.app_state = Some(app_state);
        self
    }

    /// Serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let bind_to = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = bind_to
            .parse()
            .with_context(|| format!("Bad monitoring address {}", bind_to))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Monitoring port {} unavailable", addr))?;
        info!("Serving health and metrics on http://{}", addr);

        let mut stop_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.create_router())
            .with_graceful_shutdown(async move {
                // A dropped sender stops the server too
                let _ = stop_rx.recv().await;
            })
            .await?;

        info!("Monitoring server on {} stopped", addr);
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Monitoring server was not running");
        }
        Ok(())
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE,
        "version": crate::VERSION,
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

/// Which check an orchestrator is asking for
#[derive(Debug, Clone, Copy)]
enum CheckKind {
    Liveness,
    Readiness,
}

async fn run_check(state: &HealthServerState, kind: CheckKind) -> HealthStatus {
    let Some(app_state) = state.app_state.clone() else {
        return HealthStatus::Unhealthy;
    };
    let checked = match kind {
        CheckKind::Liveness => HealthCheck::liveness_check(app_state).await,
        CheckKind::Readiness => HealthCheck::readiness_check(app_state).await,
    };
    checked.unwrap_or_else(|e| {
        error!("{:?} check failed: {}", kind, e);
        HealthStatus::Unhealthy
    })
}

fn check_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    }
}

async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let status = run_check(&state, CheckKind::Liveness).await;
    debug!("Health check answered {}", status);
    (
        check_code(status),
        Json(json!({
            "status": status,
            "service": SERVICE,
            "version": crate::VERSION
        })),
    )
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let status = run_check(&state, CheckKind::Readiness).await;
    let body = match status {
        HealthStatus::Healthy => "Ready to host lobbies",
        HealthStatus::Degraded => "Ready, some lobby workers offline",
        HealthStatus::Unhealthy => "Not ready",
    };
    (check_code(status), body)
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    match run_check(&state, CheckKind::Liveness).await {
        HealthStatus::Healthy => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    let families = state.metrics_collector.registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!("Prometheus encoding failed: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct LadderCounters {
    players: usize,
    active_queues: usize,
    players_queued: usize,
    matches_recorded: usize,
}

#[derive(Debug, Serialize)]
struct StatsBody {
    service: &'static str,
    version: &'static str,
    status: HealthStatus,
    uptime_seconds: u64,
    ladder: LadderCounters,
    workers: Vec<WorkerStatus>,
    /// Worker id to bound queue id
    bindings: HashMap<WorkerId, QueueId>,
    components: Vec<ComponentCheck>,
    timestamp: DateTime<Utc>,
}

fn stats_unavailable(reason: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "service": SERVICE, "error": reason, "timestamp": Utc::now() })),
    )
        .into_response()
}

/// Component checks, ladder counters, worker statuses and queue bindings
async fn stats_handler(State(state): State<HealthServerState>) -> Response {
    let Some(app_state) = state.app_state.clone() else {
        return stats_unavailable("service not initialized");
    };

    let health = match HealthCheck::check(app_state.clone()).await {
        Ok(health) => health,
        Err(e) => {
            warn!("Stats collection failed: {}", e);
            return stats_unavailable("stats collection failed");
        }
    };

    Json(StatsBody {
        service: SERVICE,
        version: crate::VERSION,
        status: health.status,
        uptime_seconds: health.stats.uptime_seconds,
        ladder: LadderCounters {
            players: health.stats.players,
            active_queues: health.stats.active_queues,
            players_queued: health.stats.players_queued,
            matches_recorded: health.stats.matches_recorded,
        },
        workers: app_state.worker_statuses(),
        bindings: app_state.scheduler().bindings().await,
        components: health.checks,
        timestamp: health.timestamp,
    })
    .into_response()
}
