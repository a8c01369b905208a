//! Worker pool's view of a pre-warmed or in-use session slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PooledWorkerState {
    Idle,
    Warm,
    Busy,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledWorker {
    pub id: Uuid,
    pub session_id: String,
    pub state: PooledWorkerState,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub task_count: u64,
    pub current_task: Option<Uuid>,
    pub warmup_time_ms: u64,
    pub memory_mb: u64,
}

impl PooledWorker {
    #[must_use]
    pub fn new(session_id: impl Into<String>, warmup_time_ms: u64, memory_mb: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            state: PooledWorkerState::Warm,
            created_at: now,
            last_used_at: now,
            task_count: 0,
            current_task: None,
            warmup_time_ms,
            memory_mb,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self.state, PooledWorkerState::Idle | PooledWorkerState::Warm)
    }
}
