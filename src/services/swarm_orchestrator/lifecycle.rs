//! Drives one swarm through `planning -> spawning -> executing ->
//! aggregating -> completed/failed/cancelled`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::models::swarm::{SwarmResult, SwarmState};
use crate::services::result_aggregator::RenderFormat;
use crate::services::task_planner::TaskPlanner;

use super::types::SwarmEvent;
use super::worker_monitoring::{self, MonitorOutcome};
use super::{CoordinatorError, SwarmCoordinator, TaskSource};

pub(super) async fn run(
    coordinator: &SwarmCoordinator,
    swarm_id: Uuid,
    source: TaskSource,
    format: RenderFormat,
    cancel: Arc<Notify>,
) -> Result<SwarmResult, CoordinatorError> {
    let swarm = coordinator.registry.get(swarm_id).await?;

    let tasks = match source {
        TaskSource::Decompose(options) => coordinator.planner.decompose(&swarm.task, &options).await?,
        TaskSource::Manual(instructions) => TaskPlanner::from_manual_list(instructions, swarm.config.max_workers),
    };

    coordinator.registry.transition_swarm(swarm_id, SwarmState::Spawning).await?;

    let _ = coordinator.events.send(SwarmEvent::SwarmStarted {
        swarm_id,
        worker_count: tasks.len(),
    });

    let mut spawned = Vec::new();
    let mut spawn_error = None;
    for task in tasks {
        let task_id = task.id;
        match coordinator.worker_lifecycle.spawn_worker(swarm_id, task).await {
            Ok(worker_id) => {
                spawned.push(worker_id);
                let _ = coordinator.events.send(SwarmEvent::WorkerSpawned { swarm_id, worker_id, task_id });
            }
            Err(error) => {
                spawn_error = Some(CoordinatorError::Lifecycle(error));
                break;
            }
        }
    }

    if let Some(error) = spawn_error {
        return fail(coordinator, swarm_id, error).await;
    }

    coordinator.registry.transition_swarm(swarm_id, SwarmState::Executing).await?;

    let outcome = worker_monitoring::run(
        &coordinator.registry,
        &coordinator.bus,
        &coordinator.events,
        swarm_id,
        Duration::from_millis(swarm.config.swarm_timeout_ms),
        &cancel,
    )
    .await;

    match outcome {
        MonitorOutcome::Cancelled => {
            coordinator.registry.transition_swarm(swarm_id, SwarmState::Cancelled).await?;
            let _ = coordinator.worker_lifecycle.terminate_all_workers(swarm_id, "swarm cancelled").await;
            coordinator.bus.remove_swarm_listeners(swarm_id).await;
            Err(CoordinatorError::Cancelled(swarm_id))
        }
        MonitorOutcome::TimedOut => fail(coordinator, swarm_id, CoordinatorError::SwarmTimeout(swarm_id)).await,
        MonitorOutcome::AllFailed => fail(coordinator, swarm_id, CoordinatorError::AllWorkersFailed(swarm_id)).await,
        MonitorOutcome::Completed => complete(coordinator, swarm_id, format).await,
    }
}

async fn complete(coordinator: &SwarmCoordinator, swarm_id: Uuid, format: RenderFormat) -> Result<SwarmResult, CoordinatorError> {
    let _ = coordinator.events.send(SwarmEvent::AggregationStarted { swarm_id });
    coordinator.registry.transition_swarm(swarm_id, SwarmState::Aggregating).await?;

    match coordinator.aggregator.aggregate(swarm_id, format).await {
        Ok(result) => {
            coordinator.registry.set_swarm_result(swarm_id, result.clone()).await?;
            coordinator.registry.transition_swarm(swarm_id, SwarmState::Completed).await?;
            let _ = coordinator.events.send(SwarmEvent::SwarmCompleted {
                swarm_id,
                result: Box::new(result.clone()),
            });
            coordinator.bus.remove_swarm_listeners(swarm_id).await;
            Ok(result)
        }
        Err(error) => fail(coordinator, swarm_id, CoordinatorError::Aggregator(error)).await,
    }
}

/// Fail semantics: transition to `failed`, attempt `terminateAllWorkers`,
/// emit `swarm_failed`, surface the original error.
async fn fail(coordinator: &SwarmCoordinator, swarm_id: Uuid, error: CoordinatorError) -> Result<SwarmResult, CoordinatorError> {
    let message = error.to_string();
    let _ = coordinator.registry.set_swarm_error(swarm_id, message.clone()).await;
    let _ = coordinator.registry.transition_swarm(swarm_id, SwarmState::Failed).await;
    let _ = coordinator.worker_lifecycle.terminate_all_workers(swarm_id, "swarm failed").await;
    let _ = coordinator.events.send(SwarmEvent::SwarmFailed { swarm_id, error: message });
    coordinator.bus.remove_swarm_listeners(swarm_id).await;
    Err(error)
}
