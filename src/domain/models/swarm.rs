//! Swarm domain model: the top-level orchestrated execution instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::worker::Worker;

/// Lifecycle state of a swarm. `Completed`, `Failed` and `Cancelled` are
/// terminal: once entered, no further transition is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmState {
    Planning,
    Spawning,
    Executing,
    Aggregating,
    Completed,
    Failed,
    Cancelled,
}

impl SwarmState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Transitions reachable directly from this state. `Cancelled` is
    /// reachable from every non-terminal state (`terminateSwarm` may be
    /// called at any point) and is listed explicitly per state rather than
    /// as a blanket exception so `valid_transitions` stays the single
    /// source of truth `can_transition_to` reads from.
    #[must_use]
    pub fn valid_transitions(self) -> &'static [SwarmState] {
        match self {
            Self::Planning => &[Self::Spawning, Self::Failed, Self::Cancelled],
            Self::Spawning => &[Self::Executing, Self::Failed, Self::Cancelled],
            Self::Executing => &[Self::Aggregating, Self::Failed, Self::Cancelled],
            Self::Aggregating => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

/// CPU scheduling hint forwarded to worker sessions; the core doesn't
/// enforce it, it is opaque data the actuator may honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    pub cpu_priority: CpuPriority,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            cpu_priority: CpuPriority::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            exponential_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `min(base * factor^attempt, max)`, the shared backoff shape used by
    /// both worker respawn delay and the generic retry resilience helper.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        let scaled = (self.base_delay_ms as f64) * self.exponential_factor.powi(attempt as i32);
        scaled.min(self.max_delay_ms as f64) as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub max_workers: u32,
    pub worker_timeout_ms: u64,
    pub swarm_timeout_ms: u64,
    pub retry_policy: RetryPolicy,
    pub resource_limits: ResourceLimits,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            worker_timeout_ms: 300_000,
            swarm_timeout_ms: 600_000,
            retry_policy: RetryPolicy::default(),
            resource_limits: ResourceLimits::default(),
        }
    }
}

/// The synthesized outcome of a completed (possibly partial) swarm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmResult {
    pub partial: bool,
    pub warnings: Vec<String>,
    pub result: serde_json::Value,
    pub metrics: SwarmResultMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmResultMetrics {
    pub total_duration_ms: u64,
    pub worker_count: u32,
    pub successful_workers: u32,
    pub failed_workers: u32,
    pub total_actions_performed: u64,
}

/// A single orchestrated execution: one task, N workers, one final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    pub id: Uuid,
    pub task: String,
    pub state: SwarmState,
    pub config: SwarmConfig,
    pub workers: HashMap<Uuid, Worker>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<SwarmResult>,
    pub error: Option<String>,
}

impl Swarm {
    #[must_use]
    pub fn new(task: impl Into<String>, config: SwarmConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            state: SwarmState::Planning,
            config,
            workers: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}
