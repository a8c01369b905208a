//! Worker domain model: one execution slot dedicated to one `WorkerTask`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker_task::{TaskMetrics, WorkerTask};

/// Lifecycle state of a single worker's current attempt. `Completed`,
/// `Failed` and `Terminated` are terminal for that attempt; a retried
/// worker re-enters `Spawning` under the same worker id with an
/// incremented `retry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Pending,
    Spawning,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl WorkerState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Terminated)
    }

    /// Active per the Coordinator's completion check: a swarm is done
    /// aggregating once no worker remains `Pending`, `Spawning` or `Running`.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Spawning | Self::Running)
    }

    #[must_use]
    pub fn valid_transitions(self) -> &'static [WorkerState] {
        match self {
            Self::Pending => &[Self::Spawning, Self::Terminated],
            Self::Spawning => &[Self::Running, Self::Failed, Self::Terminated],
            Self::Running => &[Self::Completed, Self::Failed, Self::Terminated],
            Self::Completed | Self::Failed | Self::Terminated => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub swarm_id: Uuid,
    pub session_id: Option<String>,
    pub task: WorkerTask,
    pub state: WorkerState,
    /// Clamped to `[0, 100]`; a completed worker always reads 100.
    pub progress: u8,
    pub current_action: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metrics: Option<TaskMetrics>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl Worker {
    #[must_use]
    pub fn new(swarm_id: Uuid, task: WorkerTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            swarm_id,
            session_id: None,
            task,
            state: WorkerState::Pending,
            progress: 0,
            current_action: None,
            result: None,
            error: None,
            metrics: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
        }
    }

    /// Sets progress, clamping to `[0, 100]`. Callers are responsible for
    /// the monotone-non-decreasing-within-an-attempt invariant; this only
    /// enforces the bound.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }
}
