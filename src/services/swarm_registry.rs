//! Swarm Registry (C6): sole owner of `Swarm` and `Worker` entity state.
//! Every other component reads swarms/workers through the
//! accessors here and publishes intent ("set worker error", "advance
//! state") through these methods rather than mutating interiors directly.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::swarm::{Swarm, SwarmConfig, SwarmResult, SwarmState};
use crate::domain::models::worker::{Worker, WorkerState};
use crate::domain::models::worker_task::{TaskMetrics, WorkerTask};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("swarm {0} not found")]
    SwarmNotFound(Uuid),

    #[error("worker {0} not found")]
    WorkerNotFound(Uuid),

    #[error("cannot create swarm: {current} non-terminal swarms already at the {limit} cap")]
    ConcurrencyLimit { current: usize, limit: u32 },

    #[error("swarm {swarm_id} already has {current} workers, at the {max} cap")]
    MaxWorkersExceeded { swarm_id: Uuid, current: usize, max: u32 },

    #[error("invalid swarm transition {from:?} -> {to:?}")]
    InvalidSwarmTransition { from: SwarmState, to: SwarmState },

    #[error("invalid worker transition {from:?} -> {to:?}")]
    InvalidWorkerTransition { from: WorkerState, to: WorkerState },
}

#[derive(Debug, Clone, Serialize)]
pub struct SwarmStatus {
    pub id: Uuid,
    pub state: SwarmState,
    pub worker_count: usize,
    pub state_counts: HashMap<String, usize>,
    pub average_progress: u8,
    pub created_at: chrono::DateTime<Utc>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub completed_at: Option<chrono::DateTime<Utc>>,
    pub error: Option<String>,
}

pub struct SwarmRegistry {
    swarms: RwLock<HashMap<Uuid, Swarm>>,
    max_concurrent_swarms: u32,
}

impl SwarmRegistry {
    #[must_use]
    pub fn new(max_concurrent_swarms: u32) -> Self {
        Self {
            swarms: RwLock::new(HashMap::new()),
            max_concurrent_swarms,
        }
    }

    pub async fn create_swarm(&self, task: impl Into<String>, config: SwarmConfig) -> Result<Swarm, RegistryError> {
        let mut swarms = self.swarms.write().await;
        let active = swarms.values().filter(|s| s.state.is_active()).count();
        if active >= self.max_concurrent_swarms as usize {
            return Err(RegistryError::ConcurrencyLimit {
                current: active,
                limit: self.max_concurrent_swarms,
            });
        }
        let swarm = Swarm::new(task, config);
        swarms.insert(swarm.id, swarm.clone());
        Ok(swarm)
    }

    pub async fn get(&self, swarm_id: Uuid) -> Result<Swarm, RegistryError> {
        self.swarms
            .read()
            .await
            .get(&swarm_id)
            .cloned()
            .ok_or(RegistryError::SwarmNotFound(swarm_id))
    }

    pub async fn exists(&self, swarm_id: Uuid) -> bool {
        self.swarms.read().await.contains_key(&swarm_id)
    }

    pub async fn delete(&self, swarm_id: Uuid) -> Result<(), RegistryError> {
        self.swarms
            .write()
            .await
            .remove(&swarm_id)
            .map(|_| ())
            .ok_or(RegistryError::SwarmNotFound(swarm_id))
    }

    pub async fn active_count(&self) -> usize {
        self.swarms.read().await.values().filter(|s| s.state.is_active()).count()
    }

    /// Advances `swarm_id`'s state, enforcing `SwarmState::valid_transitions`
    /// and the one-time `startedAt`/`completedAt` stamps.
    pub async fn transition_swarm(&self, swarm_id: Uuid, new_state: SwarmState) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        let swarm = swarms.get_mut(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;

        if !swarm.state.can_transition_to(new_state) {
            return Err(RegistryError::InvalidSwarmTransition {
                from: swarm.state,
                to: new_state,
            });
        }

        swarm.state = new_state;
        if new_state == SwarmState::Executing && swarm.started_at.is_none() {
            swarm.started_at = Some(Utc::now());
        }
        if new_state.is_terminal() && swarm.completed_at.is_none() {
            swarm.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub async fn set_swarm_error(&self, swarm_id: Uuid, error: impl Into<String>) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        let swarm = swarms.get_mut(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;
        swarm.error = Some(error.into());
        Ok(())
    }

    pub async fn set_swarm_result(&self, swarm_id: Uuid, result: SwarmResult) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        let swarm = swarms.get_mut(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;
        swarm.result = Some(result);
        Ok(())
    }

    /// Adds a worker to `swarm_id`, enforcing `config.maxWorkers`.
    pub async fn add_worker(&self, swarm_id: Uuid, task: WorkerTask) -> Result<Worker, RegistryError> {
        let mut swarms = self.swarms.write().await;
        let swarm = swarms.get_mut(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;

        if swarm.workers.len() >= swarm.config.max_workers as usize {
            return Err(RegistryError::MaxWorkersExceeded {
                swarm_id,
                current: swarm.workers.len(),
                max: swarm.config.max_workers,
            });
        }

        let worker = Worker::new(swarm_id, task);
        swarm.workers.insert(worker.id, worker.clone());
        Ok(worker)
    }

    pub async fn get_worker(&self, swarm_id: Uuid, worker_id: Uuid) -> Result<Worker, RegistryError> {
        let swarms = self.swarms.read().await;
        let swarm = swarms.get(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;
        swarm.workers.get(&worker_id).cloned().ok_or(RegistryError::WorkerNotFound(worker_id))
    }

    fn mutate_worker<T>(
        swarms: &mut HashMap<Uuid, Swarm>,
        swarm_id: Uuid,
        worker_id: Uuid,
        f: impl FnOnce(&mut Worker) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let swarm = swarms.get_mut(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;
        let worker = swarm.workers.get_mut(&worker_id).ok_or(RegistryError::WorkerNotFound(worker_id))?;
        f(worker)
    }

    pub async fn transition_worker(&self, swarm_id: Uuid, worker_id: Uuid, new_state: WorkerState) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        Self::mutate_worker(&mut swarms, swarm_id, worker_id, |worker| {
            if !worker.state.can_transition_to(new_state) {
                return Err(RegistryError::InvalidWorkerTransition {
                    from: worker.state,
                    to: new_state,
                });
            }
            worker.state = new_state;
            if new_state == WorkerState::Running && worker.started_at.is_none() {
                worker.started_at = Some(Utc::now());
            }
            if new_state.is_terminal() && worker.completed_at.is_none() {
                worker.completed_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    pub async fn set_worker_session(&self, swarm_id: Uuid, worker_id: Uuid, session_id: impl Into<String>) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        let session_id = session_id.into();
        Self::mutate_worker(&mut swarms, swarm_id, worker_id, move |worker| {
            worker.session_id = Some(session_id);
            Ok(())
        })
    }

    pub async fn update_worker_progress(
        &self,
        swarm_id: Uuid,
        worker_id: Uuid,
        progress: u8,
        current_action: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        Self::mutate_worker(&mut swarms, swarm_id, worker_id, move |worker| {
            worker.set_progress(progress);
            if current_action.is_some() {
                worker.current_action = current_action;
            }
            Ok(())
        })
    }

    pub async fn increment_retry(&self, swarm_id: Uuid, worker_id: Uuid) -> Result<u32, RegistryError> {
        let mut swarms = self.swarms.write().await;
        Self::mutate_worker(&mut swarms, swarm_id, worker_id, |worker| {
            worker.retry_count += 1;
            Ok(worker.retry_count)
        })
    }

    /// Sets the worker's result and implies `state=completed, progress=100,
    /// completedAt=now`.
    pub async fn set_worker_result(
        &self,
        swarm_id: Uuid,
        worker_id: Uuid,
        result: serde_json::Value,
        metrics: TaskMetrics,
    ) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        Self::mutate_worker(&mut swarms, swarm_id, worker_id, move |worker| {
            worker.result = Some(result);
            worker.metrics = Some(metrics);
            worker.progress = 100;
            worker.state = WorkerState::Completed;
            worker.completed_at.get_or_insert(Utc::now());
            Ok(())
        })
    }

    pub async fn set_worker_error(&self, swarm_id: Uuid, worker_id: Uuid, error: impl Into<String>) -> Result<(), RegistryError> {
        let mut swarms = self.swarms.write().await;
        let error = error.into();
        Self::mutate_worker(&mut swarms, swarm_id, worker_id, move |worker| {
            worker.error = Some(error);
            Ok(())
        })
    }

    /// Status summary: totals, per-state counts, average progress
    /// (rounded to the nearest integer), timestamps, and any error.
    pub async fn get_status(&self, swarm_id: Uuid) -> Result<SwarmStatus, RegistryError> {
        let swarms = self.swarms.read().await;
        let swarm = swarms.get(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;

        let mut state_counts: HashMap<String, usize> = HashMap::new();
        let mut progress_total: u32 = 0;
        for worker in swarm.workers.values() {
            *state_counts.entry(format!("{:?}", worker.state).to_lowercase()).or_insert(0) += 1;
            progress_total += u32::from(worker.progress);
        }

        let average_progress = if swarm.workers.is_empty() {
            0
        } else {
            ((progress_total as f64 / swarm.workers.len() as f64).round()) as u8
        };

        Ok(SwarmStatus {
            id: swarm.id,
            state: swarm.state,
            worker_count: swarm.workers.len(),
            state_counts,
            average_progress,
            created_at: swarm.created_at,
            started_at: swarm.started_at,
            completed_at: swarm.completed_at,
            error: swarm.error.clone(),
        })
    }

    /// Active worker ids (`pending`, `spawning`, or `running`) — the
    /// Coordinator's completion check is "none remain".
    pub async fn active_worker_ids(&self, swarm_id: Uuid) -> Result<HashSet<Uuid>, RegistryError> {
        let swarms = self.swarms.read().await;
        let swarm = swarms.get(&swarm_id).ok_or(RegistryError::SwarmNotFound(swarm_id))?;
        Ok(swarm
            .workers
            .values()
            .filter(|w| w.state.is_active())
            .map(|w| w.id)
            .collect())
    }
}
