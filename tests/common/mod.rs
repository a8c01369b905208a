//! Shared fixtures for the end-to-end scenario tests: a scripted LLM that
//! returns a fixed decomposition, an actuator that always grants a
//! session (or always fails, for failure-storm scenarios), and a worker
//! simulator that plays the part of the external worker processes by
//! publishing progress/completion messages onto the bus directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use swarmcore::domain::models::worker_task::TaskMetrics;
use swarmcore::domain::ports::actuator::{Actuator, OpenWindowRequest, OpenWindowResponse};
use swarmcore::domain::ports::llm_provider::LlmProvider;
use swarmcore::services::message_bus::MessageBus;
use swarmcore::services::swarm_orchestrator::SwarmEvent;

pub struct FixedDecompositionLlm {
    instructions: Vec<&'static str>,
}

impl FixedDecompositionLlm {
    pub fn new(instructions: Vec<&'static str>) -> Self {
        Self { instructions }
    }
}

#[async_trait]
impl LlmProvider for FixedDecompositionLlm {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        let subtasks: Vec<_> = self.instructions.iter().map(|instruction| json!({ "instruction": instruction })).collect();
        Ok(json!({
            "subtasks": subtasks,
            "reasoning": "fixed for test",
            "suggestedWorkerCount": subtasks.len(),
        })
        .to_string())
    }
}

/// Succeeds on every `open_window` call and counts how many it served.
pub struct CountingActuator {
    pub fail: bool,
    pub opens: AtomicU32,
}

impl CountingActuator {
    pub fn new(fail: bool) -> Self {
        Self { fail, opens: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Actuator for CountingActuator {
    async fn open_window(&self, _request: OpenWindowRequest) -> anyhow::Result<OpenWindowResponse> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("actuator unavailable")
        }
        Ok(OpenWindowResponse { window_id: format!("session-{}", Uuid::new_v4()) })
    }

    async fn close_window(&self, _window_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a simulated worker should do once it's spawned. Scripts are
/// consumed in spawn order: the lifecycle spawns workers sequentially,
/// so the Nth `WorkerSpawned` event corresponds to the Nth script.
#[derive(Clone)]
pub enum WorkerScript {
    Succeed,
    Fail(&'static str),
    /// Never sends a heartbeat or progress message — lets the lifecycle's
    /// health monitor declare it timed out, then completes once the
    /// worker is re-spawned by the retry path.
    StallThenSucceed,
}

/// Listens for `WorkerSpawned` and plays each worker's script onto the
/// bus, the way an external worker process would report its own
/// progress and completion.
pub fn simulate_workers(bus: MessageBus, mut events: broadcast::Receiver<SwarmEvent>, scripts: Vec<WorkerScript>) {
    tokio::spawn(async move {
        let mut scripts = scripts.into_iter();
        loop {
            match events.recv().await {
                Ok(SwarmEvent::WorkerSpawned { swarm_id, worker_id, task_id }) => {
                    let Some(script) = scripts.next() else { continue };
                    tokio::spawn(run_script(bus.clone(), swarm_id, worker_id, task_id, script));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

async fn run_script(bus: MessageBus, swarm_id: Uuid, worker_id: Uuid, task_id: Uuid, script: WorkerScript) {
    use swarmcore::domain::models::message::MessagePayload;

    let sender = worker_id.to_string();
    match script {
        WorkerScript::Succeed => {
            for progress in [25, 50, 75] {
                tokio::time::sleep(Duration::from_millis(20)).await;
                bus.send_to_master(
                    swarm_id,
                    sender.clone(),
                    MessagePayload::TaskProgress { task_id, progress, current_action: None, step_index: None, total_steps: None },
                )
                .await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            bus.send_to_master(
                swarm_id,
                sender,
                MessagePayload::TaskComplete {
                    task_id,
                    success: true,
                    result: json!("done"),
                    metrics: TaskMetrics { duration_ms: 100, actions_performed: 2, pages_visited: 1, extra: HashMap::new() },
                },
            )
            .await;
        }
        WorkerScript::Fail(error) => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            bus.send_to_master(
                swarm_id,
                sender,
                MessagePayload::TaskFailed {
                    task_id,
                    error: error.to_string(),
                    metrics: Some(TaskMetrics { duration_ms: 50, actions_performed: 1, pages_visited: 1, extra: HashMap::new() }),
                },
            )
            .await;
        }
        WorkerScript::StallThenSucceed => {
            // Send nothing until well past the health monitor's timeout,
            // so it marks this worker failed and the lifecycle retries it.
            tokio::time::sleep(Duration::from_millis(300)).await;
            bus.send_to_master(
                swarm_id,
                sender,
                MessagePayload::TaskComplete {
                    task_id,
                    success: true,
                    result: json!("done after retry"),
                    metrics: TaskMetrics { duration_ms: 100, actions_performed: 1, pages_visited: 1, extra: HashMap::new() },
                },
            )
            .await;
        }
    }
}
