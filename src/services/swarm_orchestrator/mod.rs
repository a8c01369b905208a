//! Swarm Coordinator (C10): the top-level state machine that decomposes a
//! task, spawns workers through the Lifecycle, monitors execution via the
//! Message Bus, and hands completed swarms to the Result Aggregator.

mod event_handling;
mod lifecycle;
mod types;
mod worker_monitoring;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Notify};
use uuid::Uuid;

use crate::domain::models::swarm::{SwarmConfig, SwarmResult};
use crate::services::message_bus::MessageBus;
use crate::services::result_aggregator::{AggregatorError, RenderFormat, ResultAggregator};
use crate::services::swarm_registry::{RegistryError, SwarmRegistry, SwarmStatus};
use crate::services::task_planner::{PlannerError, PlanningOptions, TaskPlanner};
use crate::services::worker_lifecycle::{LifecycleError, WorkerLifecycle};

pub use types::SwarmEvent;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error("swarm {0} exceeded its timeout")]
    SwarmTimeout(Uuid),

    #[error("swarm {0}: all workers failed")]
    AllWorkersFailed(Uuid),

    #[error("swarm {0} was cancelled")]
    Cancelled(Uuid),
}

/// How a swarm's workers should be planned: through the LLM-backed
/// decomposition path, or a caller-supplied instruction list with no LLM
/// call (the manual fallback).
pub enum TaskSource {
    Decompose(PlanningOptions),
    Manual(Vec<String>),
}

pub struct SwarmCoordinator {
    registry: Arc<SwarmRegistry>,
    planner: Arc<TaskPlanner>,
    worker_lifecycle: Arc<WorkerLifecycle>,
    bus: MessageBus,
    aggregator: Arc<ResultAggregator>,
    events: broadcast::Sender<SwarmEvent>,
    cancellations: Mutex<HashMap<Uuid, Arc<Notify>>>,
}

impl SwarmCoordinator {
    #[must_use]
    pub fn new(
        registry: Arc<SwarmRegistry>,
        planner: Arc<TaskPlanner>,
        worker_lifecycle: Arc<WorkerLifecycle>,
        bus: MessageBus,
        aggregator: Arc<ResultAggregator>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            registry,
            planner,
            worker_lifecycle,
            bus,
            aggregator,
            events,
            cancellations: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SwarmEvent> {
        self.events.subscribe()
    }

    /// Runs one swarm to completion (or failure/cancellation), returning
    /// its final `SwarmResult` on success.
    pub async fn execute(
        &self,
        task: impl Into<String>,
        config: SwarmConfig,
        source: TaskSource,
        format: RenderFormat,
    ) -> Result<SwarmResult, CoordinatorError> {
        let swarm = self.registry.create_swarm(task, config).await?;
        self.execute_existing(swarm.id, source, format).await
    }

    /// Runs a swarm that was already created (e.g. via the Registry
    /// directly, ahead of subscribing a streaming consumer) through the
    /// same state machine `execute` uses.
    pub async fn execute_existing(
        &self,
        swarm_id: Uuid,
        source: TaskSource,
        format: RenderFormat,
    ) -> Result<SwarmResult, CoordinatorError> {
        let cancel = Arc::new(Notify::new());
        self.cancellations.lock().await.insert(swarm_id, Arc::clone(&cancel));

        let outcome = lifecycle::run(self, swarm_id, source, format, cancel).await;

        self.cancellations.lock().await.remove(&swarm_id);
        outcome
    }

    /// Cancels an in-flight swarm. A no-op error if the swarm isn't
    /// currently executing under this coordinator.
    pub async fn terminate_swarm(&self, swarm_id: Uuid) -> Result<(), CoordinatorError> {
        let cancel = self.cancellations.lock().await.get(&swarm_id).cloned();
        match cancel {
            Some(notify) => {
                notify.notify_one();
                Ok(())
            }
            None => Err(CoordinatorError::Registry(RegistryError::SwarmNotFound(swarm_id))),
        }
    }

    pub async fn status(&self, swarm_id: Uuid) -> Result<SwarmStatus, CoordinatorError> {
        Ok(self.registry.get_status(swarm_id).await?)
    }
}
