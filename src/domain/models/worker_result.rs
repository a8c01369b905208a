//! Aggregator's view of one worker's finished output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_id: Uuid,
    pub task_id: Uuid,
    pub instruction: String,
    pub result: serde_json::Value,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}
