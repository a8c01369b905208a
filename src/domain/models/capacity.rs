//! Load balancer's view of a worker's current capacity and health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCapacity {
    pub worker_id: Uuid,
    pub active_task_count: u32,
    pub max_tasks: u32,
    pub memory_usage_mb: u64,
    pub memory_limit_mb: u64,
    pub cpu_utilization: f64,
    pub avg_task_duration_ms: Option<f64>,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub health_score: f64,
    pub last_updated: DateTime<Utc>,
    pub available: bool,
    pub specializations: HashSet<String>,
}

impl WorkerCapacity {
    #[must_use]
    pub fn new(worker_id: Uuid, max_tasks: u32, memory_limit_mb: u64) -> Self {
        Self {
            worker_id,
            active_task_count: 0,
            max_tasks,
            memory_usage_mb: 0,
            memory_limit_mb,
            cpu_utilization: 0.0,
            avg_task_duration_ms: None,
            completed_tasks: 0,
            failed_tasks: 0,
            health_score: 100.0,
            last_updated: Utc::now(),
            available: true,
            specializations: HashSet::new(),
        }
    }

    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            None
        } else {
            Some(self.completed_tasks as f64 / total as f64)
        }
    }
}
