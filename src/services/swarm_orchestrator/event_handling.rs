//! Dispatches one master-channel `Message` into the registry update and
//! domain event each worker message type maps to.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::message::MessagePayload;
use crate::domain::models::Message;
use crate::services::swarm_registry::{RegistryError, SwarmRegistry};

use super::types::SwarmEvent;

/// Applies one worker message to the Registry and emits the matching
/// `SwarmEvent`. Returns `true` when the message can affect the swarm's
/// completion check (`task_complete`/`task_failed`).
pub(super) async fn apply(
    registry: &SwarmRegistry,
    events: &broadcast::Sender<SwarmEvent>,
    swarm_id: Uuid,
    message: Message,
) -> Result<bool, RegistryError> {
    let worker_id = match message.sender_id.parse::<Uuid>() {
        Ok(id) => id,
        Err(_) => return Ok(false),
    };

    match message.payload {
        MessagePayload::TaskProgress {
            progress, current_action, ..
        } => {
            registry.update_worker_progress(swarm_id, worker_id, progress, current_action).await?;
            let _ = events.send(SwarmEvent::WorkerProgress {
                swarm_id,
                worker_id,
                progress,
            });
            Ok(false)
        }
        MessagePayload::TaskComplete { result, metrics, .. } => {
            registry.set_worker_result(swarm_id, worker_id, result, metrics).await?;
            let _ = events.send(SwarmEvent::WorkerCompleted { swarm_id, worker_id });
            Ok(true)
        }
        MessagePayload::TaskFailed { error, .. } => {
            registry.set_worker_error(swarm_id, worker_id, error.clone()).await?;
            let worker = registry.get_worker(swarm_id, worker_id).await?;
            if !worker.state.is_terminal() {
                registry
                    .transition_worker(swarm_id, worker_id, crate::domain::models::worker::WorkerState::Failed)
                    .await?;
            }
            let _ = events.send(SwarmEvent::WorkerFailed { swarm_id, worker_id, error });
            Ok(true)
        }
        _ => Ok(false),
    }
}
