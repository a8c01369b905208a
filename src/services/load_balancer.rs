//! Load Balancer (C3): worker capacity registry with strategy-pluggable
//! worker selection, health scoring, and sticky sessions.
//!
//! Owns `WorkerCapacity` exclusively; the Coordinator and Pool keep it in
//! sync via `register`/`unregister` as workers come and go rather than
//! reaching into its map directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::capacity::WorkerCapacity;
use crate::domain::models::WorkerTask;

#[derive(Debug, Error)]
pub enum LoadBalancerError {
    #[error("no available worker matches selection strategy {0:?}")]
    NoAvailableWorker(SelectionStrategy),

    #[error("worker {0} is not registered with the load balancer")]
    NotFound(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    RoundRobin,
    LeastConnections,
    Weighted,
    #[default]
    ResourceAware,
    LatencyBased,
}

/// Outcome of a completed task, fed back via `record_result` to keep
/// `successRate`/`avgTaskDurationMs`/health score current.
#[derive(Debug, Clone, Copy)]
pub struct TaskOutcome {
    pub success: bool,
    pub duration_ms: u64,
}

struct LoadBalancerState {
    capacities: HashMap<Uuid, WorkerCapacity>,
    weights: HashMap<Uuid, f64>,
    sticky_sessions: HashMap<String, Uuid>,
}

pub struct LoadBalancer {
    state: RwLock<LoadBalancerState>,
    min_health_score: f64,
    round_robin_cursor: AtomicUsize,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(min_health_score: f64) -> Self {
        Self {
            state: RwLock::new(LoadBalancerState {
                capacities: HashMap::new(),
                weights: HashMap::new(),
                sticky_sessions: HashMap::new(),
            }),
            min_health_score,
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    pub async fn register(&self, worker_id: Uuid, max_tasks: u32, memory_limit_mb: u64) {
        let mut state = self.state.write().await;
        state
            .capacities
            .insert(worker_id, WorkerCapacity::new(worker_id, max_tasks, memory_limit_mb));
        state.weights.insert(worker_id, 1.0);
    }

    pub async fn unregister(&self, worker_id: Uuid) {
        let mut state = self.state.write().await;
        state.capacities.remove(&worker_id);
        state.weights.remove(&worker_id);
        state.sticky_sessions.retain(|_, w| *w != worker_id);
    }

    pub async fn set_weight(&self, worker_id: Uuid, weight: f64) {
        self.state.write().await.weights.insert(worker_id, weight);
    }

    pub async fn add_specialization(&self, worker_id: Uuid, tag: impl Into<String>) -> Result<(), LoadBalancerError> {
        let mut state = self.state.write().await;
        let capacity = state
            .capacities
            .get_mut(&worker_id)
            .ok_or(LoadBalancerError::NotFound(worker_id))?;
        capacity.specializations.insert(tag.into());
        Ok(())
    }

    fn available(capacity: &WorkerCapacity, min_health_score: f64) -> bool {
        capacity.available && capacity.health_score >= min_health_score && capacity.active_task_count < capacity.max_tasks
    }

    /// Picks a worker for `task`, honoring a pinned `session_id` when that
    /// worker is still available, else falling back to `strategy`.
    pub async fn select(
        &self,
        task: &WorkerTask,
        strategy: SelectionStrategy,
        session_id: Option<&str>,
    ) -> Result<Uuid, LoadBalancerError> {
        let state = self.state.read().await;

        if let Some(session_id) = session_id {
            if let Some(&pinned) = state.sticky_sessions.get(session_id) {
                if let Some(capacity) = state.capacities.get(&pinned) {
                    if Self::available(capacity, self.min_health_score) {
                        return Ok(pinned);
                    }
                }
            }
        }

        let available: Vec<&WorkerCapacity> = state
            .capacities
            .values()
            .filter(|c| Self::available(c, self.min_health_score))
            .collect();

        if available.is_empty() {
            return Err(LoadBalancerError::NoAvailableWorker(strategy));
        }

        let chosen = match strategy {
            SelectionStrategy::RoundRobin => {
                let index = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst) % available.len();
                available[index].worker_id
            }
            SelectionStrategy::LeastConnections => available
                .iter()
                .min_by_key(|c| c.active_task_count)
                .expect("non-empty")
                .worker_id,
            SelectionStrategy::Weighted => self.weighted_pick(&available, &state.weights),
            SelectionStrategy::ResourceAware => available
                .iter()
                .map(|c| (c.worker_id, Self::resource_aware_score(c, task)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .expect("non-empty")
                .0,
            SelectionStrategy::LatencyBased => {
                let with_history: Vec<&&WorkerCapacity> =
                    available.iter().filter(|c| c.avg_task_duration_ms.is_some()).collect();
                if with_history.is_empty() {
                    available
                        .iter()
                        .min_by_key(|c| c.active_task_count)
                        .expect("non-empty")
                        .worker_id
                } else {
                    with_history
                        .iter()
                        .min_by(|a, b| {
                            a.avg_task_duration_ms
                                .unwrap()
                                .partial_cmp(&b.avg_task_duration_ms.unwrap())
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .expect("non-empty")
                        .worker_id
                }
            }
        };

        if let Some(session_id) = session_id {
            drop(state);
            self.state
                .write()
                .await
                .sticky_sessions
                .insert(session_id.to_string(), chosen);
        }

        Ok(chosen)
    }

    /// Deterministic weighted pick: walks workers in a stable order
    /// accumulating weight until a threshold derived from the round-robin
    /// cursor is crossed. Avoids pulling in a random-number dependency for
    /// one selection strategy.
    fn weighted_pick(&self, available: &[&WorkerCapacity], weights: &HashMap<Uuid, f64>) -> Uuid {
        let mut ordered: Vec<&WorkerCapacity> = available.to_vec();
        ordered.sort_by_key(|c| c.worker_id);
        let total_weight: f64 = ordered.iter().map(|c| weights.get(&c.worker_id).copied().unwrap_or(1.0)).sum();
        if total_weight <= 0.0 {
            return ordered[0].worker_id;
        }
        let cursor = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst);
        #[allow(clippy::cast_precision_loss)]
        let target = (cursor as f64 % 1000.0) / 1000.0 * total_weight;
        let mut acc = 0.0;
        for capacity in &ordered {
            acc += weights.get(&capacity.worker_id).copied().unwrap_or(1.0);
            if acc >= target {
                return capacity.worker_id;
            }
        }
        ordered[ordered.len() - 1].worker_id
    }

    /// Resource-aware score: active load, memory headroom, CPU headroom.
    #[must_use]
    pub fn resource_aware_score(capacity: &WorkerCapacity, task: &WorkerTask) -> f64 {
        let mut score = 100.0 + capacity.health_score;
        score -= 20.0 * f64::from(capacity.active_task_count);
        if capacity.memory_limit_mb > 0 {
            score -= 30.0 * (capacity.memory_usage_mb as f64 / capacity.memory_limit_mb as f64);
        }
        score -= 0.5 * capacity.cpu_utilization;

        if let Some(success_rate) = capacity.success_rate() {
            score += 20.0 * success_rate;
        }

        if let Some(avg_duration_ms) = capacity.avg_task_duration_ms {
            score += (20.0 - (avg_duration_ms / 60_000.0) * 20.0).max(0.0);
        }

        let instruction = task.instruction.to_lowercase();
        for tag in &capacity.specializations {
            if instruction.contains(&tag.to_lowercase()) {
                score += 30.0;
            }
        }

        score
    }

    /// Health score recomputation, called on every `record_result`.
    fn recompute_health_score(capacity: &mut WorkerCapacity) {
        let mut score = match capacity.success_rate() {
            Some(success_rate) => 100.0 * success_rate,
            None => 100.0,
        };

        if capacity.memory_limit_mb > 0 {
            score -= 20.0 * (capacity.memory_usage_mb as f64 / capacity.memory_limit_mb as f64);
        }
        score -= 0.2 * capacity.cpu_utilization;

        let stale_minutes = (Utc::now() - capacity.last_updated).num_seconds() as f64 / 60.0;
        if stale_minutes > 5.0 {
            score -= 2.0 * stale_minutes;
        }

        capacity.health_score = score.clamp(0.0, 100.0);
    }

    pub async fn record_assignment(&self, worker_id: Uuid) -> Result<(), LoadBalancerError> {
        let mut state = self.state.write().await;
        let capacity = state
            .capacities
            .get_mut(&worker_id)
            .ok_or(LoadBalancerError::NotFound(worker_id))?;
        capacity.active_task_count += 1;
        capacity.last_updated = Utc::now();
        Ok(())
    }

    pub async fn record_result(&self, worker_id: Uuid, outcome: TaskOutcome) -> Result<(), LoadBalancerError> {
        let mut state = self.state.write().await;
        let capacity = state
            .capacities
            .get_mut(&worker_id)
            .ok_or(LoadBalancerError::NotFound(worker_id))?;

        capacity.active_task_count = capacity.active_task_count.saturating_sub(1);
        if outcome.success {
            capacity.completed_tasks += 1;
        } else {
            capacity.failed_tasks += 1;
        }

        capacity.avg_task_duration_ms = Some(match capacity.avg_task_duration_ms {
            Some(avg) => {
                let n = (capacity.completed_tasks + capacity.failed_tasks) as f64;
                avg + (outcome.duration_ms as f64 - avg) / n.max(1.0)
            }
            None => outcome.duration_ms as f64,
        });

        capacity.last_updated = Utc::now();
        Self::recompute_health_score(capacity);
        Ok(())
    }

    pub async fn update_resource_usage(&self, worker_id: Uuid, memory_usage_mb: u64, cpu_utilization: f64) -> Result<(), LoadBalancerError> {
        let mut state = self.state.write().await;
        let capacity = state
            .capacities
            .get_mut(&worker_id)
            .ok_or(LoadBalancerError::NotFound(worker_id))?;
        capacity.memory_usage_mb = memory_usage_mb;
        capacity.cpu_utilization = cpu_utilization;
        capacity.last_updated = Utc::now();
        Self::recompute_health_score(capacity);
        Ok(())
    }

    pub async fn set_available(&self, worker_id: Uuid, available: bool) -> Result<(), LoadBalancerError> {
        let mut state = self.state.write().await;
        let capacity = state
            .capacities
            .get_mut(&worker_id)
            .ok_or(LoadBalancerError::NotFound(worker_id))?;
        capacity.available = available;
        Ok(())
    }

    pub async fn capacity_of(&self, worker_id: Uuid) -> Option<WorkerCapacity> {
        self.state.read().await.capacities.get(&worker_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.capacities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(instruction: &str) -> WorkerTask {
        WorkerTask::new(instruction)
    }

    #[tokio::test]
    async fn selects_least_loaded_worker() {
        let lb = LoadBalancer::new(20.0);
        let busy = Uuid::new_v4();
        let idle = Uuid::new_v4();
        lb.register(busy, 5, 512).await;
        lb.register(idle, 5, 512).await;
        lb.record_assignment(busy).await.unwrap();
        lb.record_assignment(busy).await.unwrap();

        let chosen = lb.select(&task("go"), SelectionStrategy::LeastConnections, None).await.unwrap();
        assert_eq!(chosen, idle);
    }

    #[tokio::test]
    async fn resource_aware_favors_specialization_match() {
        let lb = LoadBalancer::new(20.0);
        let generalist = Uuid::new_v4();
        let specialist = Uuid::new_v4();
        lb.register(generalist, 5, 512).await;
        lb.register(specialist, 5, 512).await;
        lb.add_specialization(specialist, "checkout").await.unwrap();

        let chosen = lb
            .select(&task("run the checkout flow"), SelectionStrategy::ResourceAware, None)
            .await
            .unwrap();
        assert_eq!(chosen, specialist);
    }

    #[tokio::test]
    async fn unavailable_worker_is_never_selected() {
        let lb = LoadBalancer::new(20.0);
        let worker = Uuid::new_v4();
        lb.register(worker, 5, 512).await;
        lb.set_available(worker, false).await.unwrap();

        let result = lb.select(&task("go"), SelectionStrategy::LeastConnections, None).await;
        assert!(matches!(result, Err(LoadBalancerError::NoAvailableWorker(_))));
    }

    #[tokio::test]
    async fn sticky_session_pins_to_same_worker() {
        let lb = LoadBalancer::new(20.0);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        lb.register(a, 5, 512).await;
        lb.register(b, 5, 512).await;

        let first = lb
            .select(&task("go"), SelectionStrategy::ResourceAware, Some("session-1"))
            .await
            .unwrap();
        let second = lb
            .select(&task("go"), SelectionStrategy::ResourceAware, Some("session-1"))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn record_result_updates_health_score_on_failure() {
        let lb = LoadBalancer::new(0.0);
        let worker = Uuid::new_v4();
        lb.register(worker, 5, 512).await;
        lb.record_assignment(worker).await.unwrap();
        lb.record_result(worker, TaskOutcome { success: false, duration_ms: 500 })
            .await
            .unwrap();

        let capacity = lb.capacity_of(worker).await.unwrap();
        assert!(capacity.health_score < 100.0);
        assert_eq!(capacity.failed_tasks, 1);
    }

    #[tokio::test]
    async fn max_tasks_exhausted_excludes_worker() {
        let lb = LoadBalancer::new(0.0);
        let worker = Uuid::new_v4();
        lb.register(worker, 1, 512).await;
        lb.record_assignment(worker).await.unwrap();

        let result = lb.select(&task("go"), SelectionStrategy::LeastConnections, None).await;
        assert!(matches!(result, Err(LoadBalancerError::NoAvailableWorker(_))));
    }
}
