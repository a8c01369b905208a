//! Domain events the Coordinator emits while driving a swarm through its
//! state machine, and the small per-swarm execution handle the facade
//! keeps to support `terminateSwarm()`.

use uuid::Uuid;

use crate::domain::models::swarm::SwarmResult;

/// One step of a swarm's execution, always scoped to a `swarm_id`. The
/// facade forwards these under a single `swarm_event` channel.
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    SwarmStarted { swarm_id: Uuid, worker_count: usize },
    WorkerSpawned { swarm_id: Uuid, worker_id: Uuid, task_id: Uuid },
    WorkerProgress { swarm_id: Uuid, worker_id: Uuid, progress: u8 },
    WorkerCompleted { swarm_id: Uuid, worker_id: Uuid },
    WorkerFailed { swarm_id: Uuid, worker_id: Uuid, error: String },
    AggregationStarted { swarm_id: Uuid },
    SwarmCompleted { swarm_id: Uuid, result: Box<SwarmResult> },
    SwarmFailed { swarm_id: Uuid, error: String },
}

impl SwarmEvent {
    #[must_use]
    pub fn swarm_id(&self) -> Uuid {
        match self {
            Self::SwarmStarted { swarm_id, .. }
            | Self::WorkerSpawned { swarm_id, .. }
            | Self::WorkerProgress { swarm_id, .. }
            | Self::WorkerCompleted { swarm_id, .. }
            | Self::WorkerFailed { swarm_id, .. }
            | Self::AggregationStarted { swarm_id }
            | Self::SwarmCompleted { swarm_id, .. }
            | Self::SwarmFailed { swarm_id, .. } => *swarm_id,
        }
    }
}
