//! Queue scheduler
//!
//! Owns the worker/queue bindings and applies one reconciliation plan per
//! tick. The bindings lock is held for the whole pass, so two passes never
//! interleave.

use crate::error::Result;
use crate::lobby::{WorkerHandle, WorkerState};
use crate::metrics::MetricsCollector;
use crate::queue::LadderQueue;
use crate::rating::LadderStore;
use crate::scheduler::reconcile::plan;
use crate::types::{QueueId, WorkerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one tick changed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub bound: usize,
    pub released: usize,
    pub refreshed: usize,
    pub closed: usize,
    pub active_queues: usize,
}

pub struct Scheduler {
    store: Arc<dyn LadderStore>,
    workers: Vec<WorkerHandle>,
    bindings: Mutex<HashMap<WorkerId, LadderQueue>>,
    metrics: Arc<MetricsCollector>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn LadderStore>,
        workers: Vec<WorkerHandle>,
        metrics: Arc<MetricsCollector>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            workers,
            bindings: Mutex::new(HashMap::new()),
            metrics,
            tick_interval,
        }
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    fn worker(&self, id: &str) -> Option<&WorkerHandle> {
        self.workers.iter().find(|w| w.id() == id)
    }

    /// Queue currently bound to `worker_id`
    pub async fn assigned_queue(&self, worker_id: &str) -> Option<QueueId> {
        self.bindings.lock().await.get(worker_id).map(|q| q.id)
    }

    /// Snapshot of all bindings
    pub async fn bindings(&self) -> HashMap<WorkerId, QueueId> {
        self.bindings
            .lock()
            .await
            .iter()
            .map(|(worker, queue)| (worker.clone(), queue.id))
            .collect()
    }

    /// Run one reconciliation pass
    pub async fn tick(&self) -> Result<TickSummary> {
        let timer = self.metrics.start_timer();
        let mut bindings = self.bindings.lock().await;

        let queues = self.store.active_queues()?;
        let statuses: Vec<_> = self.workers.iter().map(WorkerHandle::status).collect();
        let plan = plan(&bindings, &statuses, &queues);

        let mut summary = TickSummary {
            active_queues: queues.len(),
            ..TickSummary::default()
        };

        for queue_id in &plan.close {
            match self.store.close_queue(*queue_id) {
                Ok(()) => {
                    warn!(queue_id = %queue_id, "Closed a finished queue its worker left open");
                    summary.closed += 1;
                }
                Err(e) => error!(queue_id = %queue_id, "Failed to close finished queue: {}", e),
            }
        }

        for worker_id in &plan.unbind {
            if let Some(queue) = bindings.remove(worker_id) {
                info!(worker = %worker_id, queue_id = %queue.id, "Releasing queue");
            }
            if let Some(worker) = self.worker(worker_id) {
                if let Err(e) = worker.unbind().await {
                    warn!(worker = %worker_id, "Failed to release worker: {}", e);
                }
            }
            summary.released += 1;
        }

        for (worker_id, queue) in plan.refresh {
            let Some(worker) = self.worker(&worker_id) else {
                continue;
            };
            debug!(worker = %worker_id, queue_id = %queue.id, "Refreshing bound queue");
            match worker.refresh(queue.clone()).await {
                Ok(()) => {
                    bindings.insert(worker_id, queue);
                    summary.refreshed += 1;
                }
                Err(e) => warn!(worker = %worker_id, "Failed to refresh worker: {}", e),
            }
        }

        for (worker_id, queue) in plan.bind {
            let Some(worker) = self.worker(&worker_id) else {
                continue;
            };
            match worker.bind(queue.clone()).await {
                Ok(()) => {
                    info!(
                        worker = %worker_id,
                        queue_id = %queue.id,
                        players = queue.len(),
                        "Bound queue to worker"
                    );
                    bindings.insert(worker_id, queue);
                    summary.bound += 1;
                }
                Err(e) => warn!(worker = %worker_id, "Failed to bind worker: {}", e),
            }
        }

        let counts: Vec<(&str, usize)> = WorkerState::ALL
            .iter()
            .map(|state| {
                (
                    state.label(),
                    statuses.iter().filter(|s| s.state == *state).count(),
                )
            })
            .collect();
        self.metrics.set_worker_states(&counts);
        self.metrics.record_tick(
            summary.bound,
            summary.released,
            summary.active_queues,
            timer.stop(),
        );

        Ok(summary)
    }

    /// Tick on a fixed interval until shutdown is signalled
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Scheduler started with {} workers, tick every {:?}",
            self.workers.len(),
            self.tick_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) if summary.bound > 0 || summary.released > 0 => {
                            debug!(
                                "Tick bound {} and released {} of {} active queues",
                                summary.bound, summary.released, summary.active_queues
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Scheduler tick failed: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::Balancer;
    use crate::config::{BalancerConfig, LobbySettings, RatingConfig};
    use crate::lobby::{spawn, RetryPolicy, SimulatedLobbyDriver, WorkerDeps};
    use crate::queue::QueueChannel;
    use crate::rating::{InMemoryLadderStore, MatchRecorder, RatingUpdater};

    const WAIT: Duration = Duration::from_secs(5);

    async fn setup(
        worker_count: usize,
        queue_count: usize,
    ) -> (Scheduler, Arc<InMemoryLadderStore>, broadcast::Sender<()>) {
        let store = Arc::new(InMemoryLadderStore::default());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let deps = WorkerDeps {
            store: store.clone(),
            balancer: Balancer::new(BalancerConfig::default()),
            recorder: Arc::new(MatchRecorder::new(
                store.clone(),
                RatingUpdater::new(RatingConfig::with_clamping(false)),
                5,
            )),
            metrics: metrics.clone(),
        };
        let retry = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut workers = Vec::new();
        for i in 0..worker_count {
            let name = format!("bot{}", i);
            let handle = spawn(
                name.clone(),
                Arc::new(SimulatedLobbyDriver::new(name)),
                deps.clone(),
                LobbySettings::default(),
                retry,
                shutdown_tx.subscribe(),
            );
            handle
                .wait_for(|s| s.state == WorkerState::Open, WAIT)
                .await
                .unwrap();
            workers.push(handle);
        }

        let channel = store.create_channel(QueueChannel::new("main", 0)).unwrap();
        for _ in 0..queue_count {
            store.create_queue(channel.id, 10).unwrap();
        }

        let scheduler = Scheduler::new(store.clone(), workers, metrics, Duration::from_secs(1));
        (scheduler, store, shutdown_tx)
    }

    #[tokio::test]
    async fn test_three_workers_five_queues() {
        let (scheduler, store, _shutdown) = setup(3, 5).await;

        let summary = scheduler.tick().await.unwrap();
        assert_eq!(summary.bound, 3);
        assert_eq!(summary.active_queues, 5);

        let bindings = scheduler.bindings().await;
        assert_eq!(bindings.len(), 3);
        let queues = store.active_queues().unwrap();
        let unassigned = queues
            .iter()
            .filter(|q| !bindings.values().any(|id| *id == q.id))
            .count();
        assert_eq!(unassigned, 2);

        for worker in scheduler.workers() {
            let expected = scheduler.assigned_queue(worker.id()).await;
            let status = worker
                .wait_for(|s| s.queue_id.is_some(), WAIT)
                .await
                .unwrap();
            assert_eq!(status.queue_id, expected);
        }

        // A second pass changes nothing
        let summary = scheduler.tick().await.unwrap();
        assert_eq!(summary, TickSummary {
            active_queues: 5,
            ..TickSummary::default()
        });
    }

    #[tokio::test]
    async fn test_five_workers_three_queues() {
        let (scheduler, _store, _shutdown) = setup(5, 3).await;

        let summary = scheduler.tick().await.unwrap();
        assert_eq!(summary.bound, 3);

        let mut free = 0;
        for worker in scheduler.workers() {
            if scheduler.assigned_queue(worker.id()).await.is_none() {
                free += 1;
            }
        }
        assert_eq!(free, 2);
    }

    #[tokio::test]
    async fn test_closed_queue_is_released_next_tick() {
        let (scheduler, store, _shutdown) = setup(1, 2).await;
        scheduler.tick().await.unwrap();

        let first = scheduler.assigned_queue("bot0").await.unwrap();
        store.close_queue(first).unwrap();

        let summary = scheduler.tick().await.unwrap();
        assert_eq!(summary.released, 1);
        assert_eq!(summary.bound, 1);
        let second = scheduler.assigned_queue("bot0").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_started_queue_of_an_idle_lobby_is_closed() {
        let (scheduler, store, _shutdown) = setup(1, 2).await;
        scheduler.tick().await.unwrap();

        // The game came and went without the worker closing its queue
        let first = scheduler.assigned_queue("bot0").await.unwrap();
        store.mark_queue_started(first).unwrap();
        assert_eq!(scheduler.workers()[0].status().state, WorkerState::Open);

        let summary = scheduler.tick().await.unwrap();
        assert_eq!(summary.closed, 1);
        assert_eq!(summary.released, 1);
        assert_eq!(summary.bound, 1);
        assert!(!store.get_queue(first).unwrap().unwrap().active);
        assert_ne!(scheduler.assigned_queue("bot0").await, Some(first));
    }
}
