//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the ladder service: balancing,
//! rating updates, the reconciliation loop and the lobby workers.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the ladder service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Balancer metrics
    balancer_metrics: BalancerMetrics,

    /// Match recording metrics
    rating_metrics: RatingMetrics,

    /// Reconciliation loop metrics
    scheduler_metrics: SchedulerMetrics,

    /// Lobby worker metrics
    worker_metrics: WorkerMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Balancer metrics
#[derive(Clone)]
pub struct BalancerMetrics {
    /// Balance requests by mode (search, fixed) and status
    pub balance_requests_total: IntCounterVec,

    /// Admissible splits returned
    pub splits_produced_total: IntCounter,

    /// Time spent searching splits
    pub balance_duration: Histogram,
}

/// Match recording metrics
#[derive(Clone)]
pub struct RatingMetrics {
    pub matches_recorded_total: IntCounter,

    /// Refused or failed recordings
    pub recording_failures_total: IntCounter,

    pub score_changes_total: IntCounter,
}

/// Reconciliation loop metrics
#[derive(Clone)]
pub struct SchedulerMetrics {
    pub ticks_total: IntCounter,

    pub bindings_created_total: IntCounter,

    pub bindings_released_total: IntCounter,

    /// Active queues seen by the last tick
    pub active_queues: IntGauge,

    pub tick_duration: Histogram,
}

/// Lobby worker metrics
#[derive(Clone)]
pub struct WorkerMetrics {
    /// Workers per lifecycle state
    pub workers_by_state: IntGaugeVec,

    /// Kicks by reason
    pub kicks_total: IntCounterVec,

    /// Lobby commands by name and result
    pub commands_total: IntCounterVec,

    pub games_started_total: IntCounter,

    /// Driver reconnect attempts by result
    pub reconnects_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let balancer_metrics = BalancerMetrics::new(&registry)?;
        let rating_metrics = RatingMetrics::new(&registry)?;
        let scheduler_metrics = SchedulerMetrics::new(&registry)?;
        let worker_metrics = WorkerMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            balancer_metrics,
            rating_metrics,
            scheduler_metrics,
            worker_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn balancer(&self) -> &BalancerMetrics {
        &self.balancer_metrics
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    pub fn scheduler(&self) -> &SchedulerMetrics {
        &self.scheduler_metrics
    }

    pub fn worker(&self) -> &WorkerMetrics {
        &self.worker_metrics
    }

    /// Record a balance request
    pub fn record_balance(&self, mode: &str, splits: usize, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        self.balancer_metrics
            .balance_requests_total
            .with_label_values(&[mode, status])
            .inc();
        self.balancer_metrics
            .splits_produced_total
            .inc_by(splits as u64);
        self.balancer_metrics
            .balance_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a recorded match and its score changes
    pub fn record_match_recorded(&self, score_changes: usize) {
        self.rating_metrics.matches_recorded_total.inc();
        self.rating_metrics
            .score_changes_total
            .inc_by(score_changes as u64);
    }

    pub fn record_recording_failure(&self) {
        self.rating_metrics.recording_failures_total.inc();
    }

    /// Record one reconciliation pass
    pub fn record_tick(&self, bound: usize, released: usize, active_queues: usize, duration: Duration) {
        self.scheduler_metrics.ticks_total.inc();
        self.scheduler_metrics
            .bindings_created_total
            .inc_by(bound as u64);
        self.scheduler_metrics
            .bindings_released_total
            .inc_by(released as u64);
        self.scheduler_metrics
            .active_queues
            .set(active_queues as i64);
        self.scheduler_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    /// Replace the per-state worker counts
    pub fn set_worker_states(&self, counts: &[(&str, usize)]) {
        for (state, count) in counts {
            self.worker_metrics
                .workers_by_state
                .with_label_values(&[state])
                .set(*count as i64);
        }
    }

    pub fn record_kick(&self, reason: &str) {
        self.worker_metrics
            .kicks_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_command(&self, command: &str, accepted: bool) {
        let status = if accepted { "accepted" } else { "refused" };
        self.worker_metrics
            .commands_total
            .with_label_values(&[command, status])
            .inc();
    }

    pub fn record_game_started(&self) {
        self.worker_metrics.games_started_total.inc();
    }

    pub fn record_reconnect(&self, success: bool) {
        let status = if success { "success" } else { "failed" };
        self.worker_metrics
            .reconnects_total
            .with_label_values(&[status])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("inhouse_ladder_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "inhouse_ladder_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("inhouse_ladder_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl BalancerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let balance_requests_total = IntCounterVec::new(
            Opts::new(
                "inhouse_ladder_balance_requests_total",
                "Total balance requests",
            ),
            &["mode", "status"],
        )?;
        registry.register(Box::new(balance_requests_total.clone()))?;

        let splits_produced_total = IntCounter::new(
            "inhouse_ladder_splits_produced_total",
            "Admissible team splits produced",
        )?;
        registry.register(Box::new(splits_produced_total.clone()))?;

        let balance_duration = Histogram::with_opts(
            HistogramOpts::new(
                "inhouse_ladder_balance_duration_seconds",
                "Time spent balancing a roster",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(balance_duration.clone()))?;

        Ok(Self {
            balance_requests_total,
            splits_produced_total,
            balance_duration,
        })
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_recorded_total = IntCounter::new(
            "inhouse_ladder_matches_recorded_total",
            "Total matches recorded",
        )?;
        registry.register(Box::new(matches_recorded_total.clone()))?;

        let recording_failures_total = IntCounter::new(
            "inhouse_ladder_recording_failures_total",
            "Match recordings refused or failed",
        )?;
        registry.register(Box::new(recording_failures_total.clone()))?;

        let score_changes_total = IntCounter::new(
            "inhouse_ladder_score_changes_total",
            "Score changes written by recorded matches",
        )?;
        registry.register(Box::new(score_changes_total.clone()))?;

        Ok(Self {
            matches_recorded_total,
            recording_failures_total,
            score_changes_total,
        })
    }
}

impl SchedulerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ticks_total = IntCounter::new(
            "inhouse_ladder_scheduler_ticks_total",
            "Reconciliation passes run",
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let bindings_created_total = IntCounter::new(
            "inhouse_ladder_bindings_created_total",
            "Queues bound to a worker",
        )?;
        registry.register(Box::new(bindings_created_total.clone()))?;

        let bindings_released_total = IntCounter::new(
            "inhouse_ladder_bindings_released_total",
            "Workers unbound from their queue",
        )?;
        registry.register(Box::new(bindings_released_total.clone()))?;

        let active_queues =
            IntGauge::new("inhouse_ladder_active_queues", "Active queues at last tick")?;
        registry.register(Box::new(active_queues.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "inhouse_ladder_scheduler_tick_duration_seconds",
                "Reconciliation pass duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        Ok(Self {
            ticks_total,
            bindings_created_total,
            bindings_released_total,
            active_queues,
            tick_duration,
        })
    }
}

impl WorkerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let workers_by_state = IntGaugeVec::new(
            Opts::new("inhouse_ladder_workers", "Lobby workers by state"),
            &["state"],
        )?;
        registry.register(Box::new(workers_by_state.clone()))?;

        let kicks_total = IntCounterVec::new(
            Opts::new("inhouse_ladder_kicks_total", "Lobby kicks by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(kicks_total.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new("inhouse_ladder_commands_total", "Lobby commands handled"),
            &["command", "status"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let games_started_total = IntCounter::new(
            "inhouse_ladder_games_started_total",
            "Total games launched",
        )?;
        registry.register(Box::new(games_started_total.clone()))?;

        let reconnects_total = IntCounterVec::new(
            Opts::new(
                "inhouse_ladder_driver_reconnects_total",
                "Lobby driver reconnect attempts",
            ),
            &["status"],
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        Ok(Self {
            workers_by_state,
            kicks_total,
            commands_total,
            games_started_total,
            reconnects_total,
        })
    }
}
