//! Priority queue domain model: priority levels and scheduled tasks.
//!
//! The scoring formula that orders a [`ScheduledTask`] lives in
//! [`crate::services::priority_queue`]; this module holds the data only, so
//! that dequeue-time score recomputation (per the ordering guarantee that
//! scores reflect dequeue time, not enqueue time) has something stable to
//! recompute over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker_task::WorkerTask;

/// Static priority band. Higher bands carry a larger base weight in the
/// dequeue score (see `services::priority_queue::PriorityScorer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    /// Base weight used by the dequeue score formula.
    #[must_use]
    pub fn base_weight(self) -> f64 {
        match self {
            Self::Critical => 1000.0,
            Self::High => 100.0,
            Self::Normal => 10.0,
            Self::Low => 1.0,
            Self::Background => 0.1,
        }
    }

    /// One step up the band, saturating at `Critical`. Used by `preempt`,
    /// which bumps priority one step unless already critical.
    #[must_use]
    pub fn step_up(self) -> Self {
        match self {
            Self::Background => Self::Low,
            Self::Low => Self::Normal,
            Self::Normal => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// `true` if `self` outranks `other` on the static band alone (used by
    /// `upgrade_priority`, which only ever moves a task up).
    #[must_use]
    pub fn outranks(self, other: Self) -> bool {
        self.base_weight() > other.base_weight()
    }
}

/// A `WorkerTask` once it has entered the priority queue, carrying the
/// scheduling metadata needed to compute and break ties on its dequeue
/// score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task: WorkerTask,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    pub added_at: DateTime<Utc>,
    /// Set while a worker is actively processing this task; a scheduled
    /// task is never dequeued again until this is cleared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker_id: Option<Uuid>,
    pub dependencies_resolved: bool,
    pub preempt_count: u32,
    /// Monotonically increasing insertion index, used as the tie-break key
    /// (lower wins) when two tasks land on the same score.
    pub original_position: u64,
}

impl ScheduledTask {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.task.id
    }

    /// Eligible for dequeue: dependencies resolved and not already claimed
    /// by an in-flight worker.
    #[must_use]
    pub fn is_dequeuable(&self) -> bool {
        self.dependencies_resolved && self.scheduled_at.is_none()
    }
}
