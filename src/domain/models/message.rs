//! Message bus envelope and the worker/master message contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a message is addressed to within a swarm's channel set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetId {
    Worker(Uuid),
    Master,
    Broadcast,
}

impl TargetId {
    /// The channel name this target resolves to, per the naming scheme
    /// `swarm:{swarmId}:master` / `swarm:{swarmId}:worker:{workerId}` /
    /// `swarm:{swarmId}:broadcast`.
    #[must_use]
    pub fn channel(&self, swarm_id: Uuid) -> String {
        match self {
            Self::Master => format!("swarm:{swarm_id}:master"),
            Self::Worker(worker_id) => format!("swarm:{swarm_id}:worker:{worker_id}"),
            Self::Broadcast => format!("swarm:{swarm_id}:broadcast"),
        }
    }
}

/// The wiretap channel every non-broadcast send is mirrored onto.
#[must_use]
pub fn wiretap_channel(swarm_id: Uuid) -> String {
    format!("swarm:{swarm_id}:all")
}

/// Discriminated payload for each message type in the worker/master
/// contract. Keeping this as an enum rather than an opaque JSON blob
/// means validation happens once, at construction, rather than being
/// re-derived by every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MessagePayload {
    TaskAssign(Box<crate::domain::models::worker_task::WorkerTask>),
    TaskProgress {
        task_id: Uuid,
        progress: u8,
        current_action: Option<String>,
        step_index: Option<u32>,
        total_steps: Option<u32>,
    },
    TaskComplete {
        task_id: Uuid,
        success: bool,
        result: serde_json::Value,
        metrics: crate::domain::models::worker_task::TaskMetrics,
    },
    TaskFailed {
        task_id: Uuid,
        error: String,
        metrics: Option<crate::domain::models::worker_task::TaskMetrics>,
    },
    Heartbeat {
        worker_id: Uuid,
        state: String,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    Terminate {
        reason: String,
    },
    Coordination {
        action: CoordinationAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub swarm_id: Uuid,
    pub sender_id: String,
    pub target: TargetId,
    pub payload: MessagePayload,
}

impl Message {
    #[must_use]
    pub fn new(swarm_id: Uuid, sender_id: impl Into<String>, target: TargetId, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            swarm_id,
            sender_id: sender_id.into(),
            target,
            payload,
        }
    }

    /// The message `type` tag, used by `waitFor`'s type match.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match &self.payload {
            MessagePayload::TaskAssign(_) => "task_assign",
            MessagePayload::TaskProgress { .. } => "task_progress",
            MessagePayload::TaskComplete { .. } => "task_complete",
            MessagePayload::TaskFailed { .. } => "task_failed",
            MessagePayload::Heartbeat { .. } => "heartbeat",
            MessagePayload::Terminate { .. } => "terminate",
            MessagePayload::Coordination { .. } => "coordination",
        }
    }
}
