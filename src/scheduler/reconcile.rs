//! Reconciliation planning
//!
//! Compares the bindings the scheduler holds with the workers' published
//! status and the store's active queues, and decides which messages to send.
//! Nothing here talks to a worker.

use crate::lobby::{WorkerState, WorkerStatus};
use crate::queue::LadderQueue;
use crate::types::{QueueId, WorkerId};
use std::collections::{HashMap, HashSet};

/// Messages one reconciliation pass sends
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcilePlan {
    /// Bound queues whose content changed since the last pass
    pub refresh: Vec<(WorkerId, LadderQueue)>,
    pub unbind: Vec<WorkerId>,
    pub bind: Vec<(WorkerId, LadderQueue)>,
    /// Queues whose game is over but that were never closed
    pub close: Vec<QueueId>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.refresh.is_empty()
            && self.unbind.is_empty()
            && self.bind.is_empty()
            && self.close.is_empty()
    }
}

/// Plan one pass.
///
/// Workers in game keep their binding untouched. A disconnected worker loses
/// its binding and gets no new one. A binding whose queue is no longer active
/// is released; the worker may take a new queue in the same pass. So is a
/// started queue whose worker has left the game, and that queue is closed.
/// Unassigned queues that have not started go to workers that can take one,
/// oldest first, in worker order.
pub fn plan(
    bindings: &HashMap<WorkerId, LadderQueue>,
    workers: &[WorkerStatus],
    queues: &[LadderQueue],
) -> ReconcilePlan {
    let active: HashMap<QueueId, &LadderQueue> = queues.iter().map(|q| (q.id, q)).collect();
    let mut plan = ReconcilePlan::default();
    let mut taken: HashSet<QueueId> = HashSet::new();
    let mut free: Vec<&WorkerId> = Vec::new();

    for status in workers {
        let in_game = status.state == WorkerState::InGame;

        if let Some(bound) = bindings.get(&status.id) {
            if in_game {
                taken.insert(bound.id);
                continue;
            }
            if !status.connected {
                plan.unbind.push(status.id.clone());
                continue;
            }
            match active.get(&bound.id) {
                Some(queue) if queue.game_started() => {
                    plan.close.push(queue.id);
                    plan.unbind.push(status.id.clone());
                }
                Some(queue) => {
                    taken.insert(queue.id);
                    if *queue != bound {
                        plan.refresh.push((status.id.clone(), (*queue).clone()));
                    }
                    continue;
                }
                None => plan.unbind.push(status.id.clone()),
            }
        }

        if status.can_take_queue() {
            free.push(&status.id);
        }
    }

    let waiting = queues
        .iter()
        .filter(|q| !q.game_started() && !taken.contains(&q.id));
    for (worker_id, queue) in free.into_iter().zip(waiting) {
        plan.bind.push((worker_id.clone(), queue.clone()));
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueChannel;
    use chrono::{Duration, Utc};

    fn worker(id: &str, state: WorkerState, connected: bool) -> WorkerStatus {
        WorkerStatus {
            id: id.to_string(),
            state,
            connected,
            queue_id: None,
            balanced: false,
            members: 0,
        }
    }

    fn queues(count: usize) -> Vec<LadderQueue> {
        let channel = QueueChannel::new("main", 0);
        let start = Utc::now();
        (0..count)
            .map(|i| {
                let mut queue = LadderQueue::new(&channel, 10);
                queue.created_at = start + Duration::seconds(i as i64);
                queue
            })
            .collect()
    }

    fn open_workers(count: usize) -> Vec<WorkerStatus> {
        (0..count)
            .map(|i| worker(&format!("bot{}", i), WorkerState::Open, true))
            .collect()
    }

    #[test]
    fn test_more_queues_than_workers() {
        let queues = queues(5);
        let workers = open_workers(3);
        let plan = plan(&HashMap::new(), &workers, &queues);

        assert_eq!(plan.bind.len(), 3);
        let bound: Vec<QueueId> = plan.bind.iter().map(|(_, q)| q.id).collect();
        assert_eq!(bound, vec![queues[0].id, queues[1].id, queues[2].id]);
        assert!(plan.unbind.is_empty());
    }

    #[test]
    fn test_more_workers_than_queues() {
        let queues = queues(3);
        let workers = open_workers(5);
        let plan = plan(&HashMap::new(), &workers, &queues);

        assert_eq!(plan.bind.len(), 3);
        let workers_used: HashSet<&str> = plan.bind.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(workers_used.len(), 3);
    }

    #[test]
    fn test_steady_state_is_a_no_op() {
        let queues = queues(2);
        let workers = open_workers(2);
        let bindings: HashMap<WorkerId, LadderQueue> = workers
            .iter()
            .zip(&queues)
            .map(|(w, q)| (w.id.clone(), q.clone()))
            .collect();

        assert!(plan(&bindings, &workers, &queues).is_empty());
    }

    #[test]
    fn test_changed_queue_is_refreshed() {
        let mut queues = queues(1);
        let workers = open_workers(1);
        let bindings = HashMap::from([(workers[0].id.clone(), queues[0].clone())]);

        queues[0].capacity = 8;
        let plan = plan(&bindings, &workers, &queues);
        assert_eq!(plan.refresh.len(), 1);
        assert!(plan.bind.is_empty());
    }

    #[test]
    fn test_closed_queue_releases_worker() {
        let queues = queues(2);
        let workers = open_workers(1);
        let bindings = HashMap::from([(workers[0].id.clone(), queues[0].clone())]);

        // First queue closed after its game
        let plan = plan(&bindings, &workers, &queues[1..]);
        assert_eq!(plan.unbind, vec!["bot0".to_string()]);
        assert_eq!(plan.bind.len(), 1);
        assert_eq!(plan.bind[0].1.id, queues[1].id);
    }

    #[test]
    fn test_in_game_and_disconnected_workers() {
        let queues = queues(3);
        let workers = vec![
            worker("bot0", WorkerState::InGame, false),
            worker("bot1", WorkerState::Open, false),
            worker("bot2", WorkerState::Configuring, true),
        ];
        let bindings = HashMap::from([
            ("bot0".to_string(), queues[0].clone()),
            ("bot1".to_string(), queues[1].clone()),
        ]);

        let plan = plan(&bindings, &workers, &queues);
        assert_eq!(plan.unbind, vec!["bot1".to_string()]);
        // bot0 keeps queue 0 while in game, bot2 takes the oldest free one
        assert_eq!(plan.bind.len(), 1);
        assert_eq!(plan.bind[0].0, "bot2");
        assert_eq!(plan.bind[0].1.id, queues[1].id);
    }

    #[test]
    fn test_finished_queue_left_open_is_closed() {
        let mut queues = queues(3);
        queues[0].game_started_at = Some(Utc::now());
        queues[1].game_started_at = Some(Utc::now());
        let workers = vec![
            worker("bot0", WorkerState::Open, true),
            worker("bot1", WorkerState::PostGame, true),
        ];
        let bindings = HashMap::from([
            ("bot0".to_string(), queues[0].clone()),
            ("bot1".to_string(), queues[1].clone()),
        ]);

        let plan = plan(&bindings, &workers, &queues);
        assert_eq!(plan.close, vec![queues[0].id, queues[1].id]);
        assert_eq!(plan.unbind, vec!["bot0".to_string(), "bot1".to_string()]);
        // Only the open lobby takes the waiting queue
        assert_eq!(plan.bind.len(), 1);
        assert_eq!(plan.bind[0].0, "bot0");
        assert_eq!(plan.bind[0].1.id, queues[2].id);
    }

    #[test]
    fn test_started_queue_is_not_handed_out() {
        let mut queues = queues(2);
        queues[0].game_started_at = Some(Utc::now());
        let workers = open_workers(2);

        let plan = plan(&HashMap::new(), &workers, &queues);
        assert_eq!(plan.bind.len(), 1);
        assert_eq!(plan.bind[0].1.id, queues[1].id);
    }
}
