//! Worker task domain model.
//!
//! A [`WorkerTask`] is the unit of work assigned to a single worker: one
//! instruction, optionally scoped to a starting URL, with an optional
//! per-task timeout and a set of task ids it depends on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One worker's share of a decomposed swarm task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTask {
    pub id: Uuid,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl WorkerTask {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            start_url: None,
            timeout_ms: None,
            dependencies: Vec::new(),
            output_schema: None,
        }
    }

    #[must_use]
    pub fn with_start_url(mut self, start_url: impl Into<String>) -> Self {
        self.start_url = Some(start_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Uuid>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Aggregate outcome a worker reports on completion, keyed by the
/// `metrics` field of the `task_complete`/`task_failed` message contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub duration_ms: u64,
    #[serde(default)]
    pub actions_performed: u32,
    #[serde(default)]
    pub pages_visited: u32,
    #[serde(flatten, default)]
    pub extra: HashMap<String, serde_json::Value>,
}
