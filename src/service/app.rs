//! Main application state and service coordination
//!
//! `AppState` wires the ladder store, balancer, recorder, queue admission,
//! lobby workers and scheduler together and owns the background tasks.

use crate::balancer::Balancer;
use crate::config::AppConfig;
use crate::lobby::{self, LobbyDriver, RetryPolicy, SimulatedLobbyDriver, WorkerDeps, WorkerStatus};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::queue::{AfkWatchdog, QueueChannel, QueueService};
use crate::rating::{InMemoryLadderStore, LadderSettings, LadderStore, MatchRecorder, RatingUpdater};
use crate::scheduler::Scheduler;
use crate::service::health::HealthCheck;
use crate::types::{NewPlayer, RoleScores, WorkerId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn LadderStore>,
    queue_service: Arc<QueueService>,
    recorder: Arc<MatchRecorder>,
    metrics: Arc<MetricsCollector>,
    drivers: Vec<(WorkerId, Arc<dyn LobbyDriver>)>,
    scheduler: Arc<Scheduler>,
    shutdown_tx: broadcast::Sender<()>,
    health_server: Mutex<Option<Arc<HealthServer>>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    is_running: RwLock<bool>,
    started_at: Instant,
}

impl AppState {
    /// Build the service with one simulated driver session per worker
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let drivers = (0..config.driver.worker_count)
            .map(|i| {
                let id = format!("{}{}", config.driver.login_prefix, i + 1);
                let driver: Arc<dyn LobbyDriver> = Arc::new(SimulatedLobbyDriver::new(id.clone()));
                (id, driver)
            })
            .collect();
        Self::with_drivers(config, drivers).await
    }

    /// Build the service around the given driver sessions
    pub async fn with_drivers(
        config: AppConfig,
        drivers: Vec<(WorkerId, Arc<dyn LobbyDriver>)>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing ladder service '{}'", config.service.name);
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let store: Arc<dyn LadderStore> =
            Arc::new(InMemoryLadderStore::new(LadderSettings::from(&config.rating)));
        let balancer = Balancer::new(config.balancer.clone());
        let recorder = Arc::new(MatchRecorder::new(
            store.clone(),
            RatingUpdater::new(config.rating.clone()),
            config.balancer.team_size,
        ));
        let queue_service = Arc::new(QueueService::new(store.clone(), balancer.clone()));

        let (shutdown_tx, _) = broadcast::channel(16);
        let deps = WorkerDeps {
            store: store.clone(),
            balancer,
            recorder: recorder.clone(),
            metrics: metrics.clone(),
        };
        let retry = RetryPolicy::from(&config.driver);

        let workers = drivers
            .iter()
            .map(|(id, driver)| {
                lobby::spawn(
                    id.clone(),
                    driver.clone(),
                    deps.clone(),
                    config.lobby.clone(),
                    retry,
                    shutdown_tx.subscribe(),
                )
            })
            .collect();
        info!("Spawned {} lobby workers", drivers.len());

        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            workers,
            metrics.clone(),
            config.tick_interval(),
        ));

        Ok(Self {
            config,
            store,
            queue_service,
            recorder,
            metrics,
            drivers,
            scheduler,
            shutdown_tx,
            health_server: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: RwLock::new(false),
            started_at: Instant::now(),
        })
    }

    /// Start the scheduler, the AFK watchdog, health endpoints and metrics upkeep
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting ladder service");
        *self.is_running.write().await = true;

        let mut tasks = self.background_tasks.lock().await;

        tasks.push(tokio::spawn(
            self.scheduler.clone().run(self.shutdown_tx.subscribe()),
        ));

        let watchdog = AfkWatchdog::new(
            self.store.clone(),
            Duration::from_secs(self.config.scheduler.afk_limit_seconds),
            self.config.afk_check_interval(),
        );
        tasks.push(tokio::spawn(watchdog.run(self.shutdown_tx.subscribe())));

        let health_server = Arc::new(
            HealthServer::new(
                HealthServerConfig {
                    port: self.config.service.health_port,
                    host: "0.0.0.0".to_string(),
                },
                self.metrics.clone(),
            )
            .with_app_state(self.clone()),
        );
        *self.health_server.lock().await = Some(health_server.clone());
        tasks.push(tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            }
        }));

        tasks.push(self.spawn_health_metrics_task());

        info!("{} background tasks started", tasks.len());
        Ok(())
    }

    fn spawn_health_metrics_task(self: &Arc<Self>) -> JoinHandle<()> {
        let app = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {}
                }

                app.metrics
                    .service()
                    .uptime_seconds
                    .set(app.uptime().as_secs() as i64);
                match HealthCheck::check(app.clone()).await {
                    Ok(health) => {
                        app.metrics.update_health_status(health.status.as_gauge());
                        for check in &health.checks {
                            app.metrics.update_component_health(
                                &check.name,
                                check.status != crate::service::HealthStatus::Unhealthy,
                            );
                        }
                        debug!("Health {}: {:?}", health.status, health.stats);
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }
        })
    }

    /// Signal every task to stop and wait for them up to the shutdown timeout
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of ladder service");
        *self.is_running.write().await = false;

        // Receivers may all be gone already
        let _ = self.shutdown_tx.send(());

        if let Some(server) = self.health_server.lock().await.take() {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.background_tasks.lock().await.drain(..).collect();
        let count = tasks.len();
        let wait_all = async {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!("Background task ended abnormally: {}", e);
                }
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout(), wait_all)
            .await
            .is_err()
        {
            return Err(ServiceError::BackgroundTask {
                message: format!("{} tasks did not stop in time", count),
            });
        }

        info!("Ladder service shutdown completed");
        Ok(())
    }

    /// Register a demo roster and queue it in a fresh channel
    pub fn seed_demo(&self) -> crate::error::Result<QueueChannel> {
        let channel = self.store.create_channel(QueueChannel::new("demo", 0))?;
        let roster_size = self.config.balancer.roster_size();

        for i in 0..roster_size {
            let mut player = self.store.register_player(NewPlayer {
                name: format!("demo{}", i + 1),
                dota_mmr: 2000 + 250 * i as i32,
                account_id: Some(1000 + i as u64),
                discord_id: None,
                roles: RoleScores::default(),
            })?;
            player.vouched = true;
            self.store.update_player(player.clone())?;
            self.queue_service.join(&player.id, channel.id)?;
        }

        info!("Seeded {} demo players into channel {}", roster_size, channel.id);
        Ok(channel)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn store(&self) -> Arc<dyn LadderStore> {
        self.store.clone()
    }

    pub fn queue_service(&self) -> Arc<QueueService> {
        self.queue_service.clone()
    }

    pub fn recorder(&self) -> Arc<MatchRecorder> {
        self.recorder.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    /// Driver session of a worker
    pub fn driver(&self, worker_id: &str) -> Option<Arc<dyn LobbyDriver>> {
        self.drivers
            .iter()
            .find(|(id, _)| id == worker_id)
            .map(|(_, driver)| driver.clone())
    }

    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.scheduler
            .workers()
            .iter()
            .map(|worker| worker.status())
            .collect()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
