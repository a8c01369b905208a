//! Worker Lifecycle (C8): spawns worker sessions, runs heartbeat/progress
//! health monitoring, retries failed attempts, and terminates workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::models::message::CoordinationAction;
use crate::domain::models::worker::WorkerState;
use crate::domain::models::{MessagePayload, TargetId, WorkerTask};
use crate::domain::ports::actuator::{Actuator, OpenWindowRequest};
use crate::services::message_bus::MessageBus;
use crate::services::swarm_registry::{RegistryError, SwarmRegistry};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to allocate a worker session: {0}")]
    SpawnFailed(#[source] anyhow::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("worker {0} missed its heartbeat deadline")]
    HeartbeatTimeout(Uuid),

    #[error("worker {0} exceeded its per-attempt timeout")]
    WorkerTimeout(Uuid),
}

#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub progress_stale_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 15_000,
            progress_stale_ms: 60_000,
        }
    }
}

struct MonitorHandle {
    task: JoinHandle<()>,
}

pub struct WorkerLifecycle {
    actuator: Arc<dyn Actuator>,
    bus: MessageBus,
    registry: Arc<SwarmRegistry>,
    config: LifecycleConfig,
    monitors: Mutex<HashMap<Uuid, MonitorHandle>>,
}

impl WorkerLifecycle {
    #[must_use]
    pub fn new(actuator: Arc<dyn Actuator>, bus: MessageBus, registry: Arc<SwarmRegistry>, config: LifecycleConfig) -> Arc<Self> {
        Arc::new(Self {
            actuator,
            bus,
            registry,
            config,
            monitors: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a `Worker`, allocates its session, and starts health
    /// monitoring on success. On allocation failure the worker is left
    /// `failed` with the error recorded, and the error propagates so the
    /// Coordinator can decide whether the swarm still has enough workers.
    pub async fn spawn_worker(self: &Arc<Self>, swarm_id: Uuid, task: WorkerTask) -> Result<Uuid, LifecycleError> {
        let worker = self.registry.add_worker(swarm_id, task).await?;
        self.registry.transition_worker(swarm_id, worker.id, WorkerState::Spawning).await?;

        match self.allocate_session(&worker.task).await {
            Ok(session_id) => {
                self.registry.set_worker_session(swarm_id, worker.id, session_id).await?;
                self.registry.transition_worker(swarm_id, worker.id, WorkerState::Running).await?;
                self.start_health_monitor(swarm_id, worker.id).await;
                Ok(worker.id)
            }
            Err(error) => {
                let message = error.to_string();
                self.registry.transition_worker(swarm_id, worker.id, WorkerState::Failed).await?;
                self.registry.set_worker_error(swarm_id, worker.id, message).await?;
                Err(LifecycleError::SpawnFailed(error))
            }
        }
    }

    async fn allocate_session(&self, task: &WorkerTask) -> anyhow::Result<String> {
        let response = self
            .actuator
            .open_window(OpenWindowRequest {
                url: task.start_url.clone(),
                focused: false,
                width: None,
                height: None,
            })
            .await?;
        Ok(response.window_id)
    }

    async fn start_health_monitor(self: &Arc<Self>, swarm_id: Uuid, worker_id: Uuid) {
        let lifecycle = Arc::clone(self);
        let task = tokio::spawn(async move {
            lifecycle.run_health_monitor(swarm_id, worker_id).await;
        });
        self.monitors.lock().await.insert(worker_id, MonitorHandle { task });
    }

    async fn run_health_monitor(self: Arc<Self>, swarm_id: Uuid, worker_id: Uuid) {
        let mut subscription = self.bus.subscribe(swarm_id, TargetId::Master).await;
        let mut last_heartbeat = Utc::now();
        let mut last_progress = Utc::now();
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let worker = match self.registry.get_worker(swarm_id, worker_id).await {
                        Ok(worker) => worker,
                        Err(_) => return,
                    };
                    if worker.state.is_terminal() {
                        return;
                    }

                    let now = Utc::now();
                    if (now - last_heartbeat).num_milliseconds().max(0) as u64 > self.config.heartbeat_timeout_ms {
                        self.handle_worker_failure(swarm_id, worker_id, LifecycleError::HeartbeatTimeout(worker_id)).await;
                        return;
                    }
                    if worker.state == WorkerState::Running
                        && (now - last_progress).num_milliseconds().max(0) as u64 > self.config.progress_stale_ms
                    {
                        tracing::warn!(%swarm_id, %worker_id, "worker progress stale, escalation reserved");
                    }
                }
                message = subscription.recv() => {
                    let Some(message) = message else { return };
                    if message.sender_id != worker_id.to_string() {
                        continue;
                    }
                    match message.payload {
                        MessagePayload::Heartbeat { .. } => last_heartbeat = Utc::now(),
                        MessagePayload::TaskProgress { .. } => {
                            last_heartbeat = Utc::now();
                            last_progress = Utc::now();
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// On failure: retry up to `retryPolicy.maxRetries` with jittered
    /// backoff, else mark the worker permanently failed.
    async fn handle_worker_failure(self: &Arc<Self>, swarm_id: Uuid, worker_id: Uuid, error: LifecycleError) {
        let Ok(swarm) = self.registry.get(swarm_id).await else { return };
        let Ok(worker) = self.registry.get_worker(swarm_id, worker_id).await else { return };

        if worker.retry_count < swarm.config.retry_policy.max_retries {
            let delay_ms = swarm.config.retry_policy.backoff_for_attempt(worker.retry_count);
            tracing::warn!(%swarm_id, %worker_id, %error, delay_ms, "retrying worker after failure");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            if let Some(session_id) = &worker.session_id {
                let _ = self.actuator.close_window(session_id).await;
            }

            if self.registry.increment_retry(swarm_id, worker_id).await.is_err() {
                return;
            }
            let _ = self
                .registry
                .transition_worker(swarm_id, worker_id, WorkerState::Spawning)
                .await;

            match self.allocate_session(&worker.task).await {
                Ok(session_id) => {
                    let _ = self.registry.set_worker_session(swarm_id, worker_id, session_id).await;
                    let _ = self.registry.transition_worker(swarm_id, worker_id, WorkerState::Running).await;
                    self.start_health_monitor(swarm_id, worker_id).await;
                }
                Err(spawn_error) => {
                    let _ = self.registry.transition_worker(swarm_id, worker_id, WorkerState::Failed).await;
                    let _ = self.registry.set_worker_error(swarm_id, worker_id, spawn_error.to_string()).await;
                }
            }
        } else {
            tracing::error!(%swarm_id, %worker_id, %error, "worker failed permanently, retries exhausted");
            let _ = self.registry.transition_worker(swarm_id, worker_id, WorkerState::Failed).await;
            let _ = self.registry.set_worker_error(swarm_id, worker_id, error.to_string()).await;
        }
    }

    /// Sends `terminate`, closes the session, and transitions to
    /// `terminated`. Idempotent: a worker already in a terminal state is
    /// left untouched.
    pub async fn terminate_worker(&self, swarm_id: Uuid, worker_id: Uuid, reason: impl Into<String>) -> Result<(), LifecycleError> {
        let worker = self.registry.get_worker(swarm_id, worker_id).await?;
        if worker.state.is_terminal() {
            return Ok(());
        }

        self.bus.terminate_worker(swarm_id, worker_id, reason).await;
        if let Some(session_id) = &worker.session_id {
            let _ = self.actuator.close_window(session_id).await;
        }
        self.registry.transition_worker(swarm_id, worker_id, WorkerState::Terminated).await?;

        if let Some(handle) = self.monitors.lock().await.remove(&worker_id) {
            handle.task.abort();
        }
        Ok(())
    }

    /// Broadcasts `terminate` once, then terminates every non-terminal
    /// worker in the swarm in parallel.
    pub async fn terminate_all_workers(&self, swarm_id: Uuid, reason: impl Into<String>) -> Result<(), LifecycleError> {
        let reason = reason.into();
        self.bus
            .broadcast(swarm_id, "master", MessagePayload::Terminate { reason: reason.clone() })
            .await;

        let swarm = self.registry.get(swarm_id).await?;
        let worker_ids: Vec<Uuid> = swarm.workers.values().filter(|w| !w.state.is_terminal()).map(|w| w.id).collect();

        let futures = worker_ids.into_iter().map(|worker_id| self.terminate_worker(swarm_id, worker_id, reason.clone()));
        for result in futures::future::join_all(futures).await {
            result?;
        }
        Ok(())
    }

    pub async fn pause_worker(&self, swarm_id: Uuid, worker_id: Uuid) {
        self.bus.coordinate(swarm_id, worker_id, CoordinationAction::Pause).await;
    }

    pub async fn resume_worker(&self, swarm_id: Uuid, worker_id: Uuid) {
        self.bus.coordinate(swarm_id, worker_id, CoordinationAction::Resume).await;
    }
}
