//! In-memory capability-port implementations for the demo binary. None of
//! this runs a real browser or LLM: `DemoActuator` hands out fake window
//! ids, `DemoLlmProvider` returns a canned decomposition, and
//! `simulate_workers` plays the part of the worker processes that would
//! normally report progress over the bus themselves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::message::MessagePayload;
use crate::domain::models::worker_task::TaskMetrics;
use crate::domain::models::WorkerResult;
use crate::domain::ports::actuator::{Actuator, OpenWindowRequest, OpenWindowResponse};
use crate::domain::ports::llm_provider::LlmProvider;
use crate::domain::ports::synthesizer::Synthesizer;
use crate::services::message_bus::MessageBus;
use crate::services::swarm_orchestrator::SwarmEvent;

/// Hands out a fresh fake window id per call; nothing is actually opened.
pub struct DemoActuator;

#[async_trait]
impl Actuator for DemoActuator {
    async fn open_window(&self, _request: OpenWindowRequest) -> anyhow::Result<OpenWindowResponse> {
        Ok(OpenWindowResponse {
            window_id: format!("demo-window-{}", Uuid::new_v4()),
        })
    }

    async fn close_window(&self, _window_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Splits the task description on commas/" and " into up to
/// `max_workers` subtasks rather than calling a real model.
pub struct DemoLlmProvider;

#[async_trait]
impl LlmProvider for DemoLlmProvider {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let task_line = prompt
            .lines()
            .find(|line| line.starts_with("Task: "))
            .map(|line| line.trim_start_matches("Task: "))
            .unwrap_or(prompt);

        let parts: Vec<&str> = task_line.split([',']).flat_map(|p| p.split(" and ")).map(str::trim).filter(|p| !p.is_empty()).collect();
        let parts = if parts.is_empty() { vec![task_line] } else { parts };

        let subtasks: Vec<_> = parts
            .iter()
            .map(|instruction| json!({ "instruction": instruction }))
            .collect();

        Ok(json!({
            "subtasks": subtasks,
            "reasoning": "split the task description on its natural conjunctions",
            "suggestedWorkerCount": subtasks.len(),
        })
        .to_string())
    }
}

/// Joins worker results into one JSON object keyed by instruction.
pub struct DemoSynthesizer;

#[async_trait]
impl Synthesizer for DemoSynthesizer {
    async fn synthesize(&self, task: &str, results: &[WorkerResult], _output_format: &str) -> anyhow::Result<serde_json::Value> {
        let by_instruction: serde_json::Map<String, serde_json::Value> = results
            .iter()
            .map(|r| (r.instruction.clone(), r.result.clone()))
            .collect();
        Ok(json!({ "task": task, "results": by_instruction }))
    }
}

/// Listens for `WorkerSpawned` and, per worker, plays out a short fake
/// execution: a couple of progress ticks then a `task_complete` on the
/// swarm's master channel, exactly as a real worker process would.
pub fn simulate_workers(bus: MessageBus, mut events: broadcast::Receiver<SwarmEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SwarmEvent::WorkerSpawned { swarm_id, worker_id, task_id }) => {
                    let bus = bus.clone();
                    tokio::spawn(run_fake_worker(bus, swarm_id, worker_id, task_id));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

async fn run_fake_worker(bus: MessageBus, swarm_id: Uuid, worker_id: Uuid, task_id: Uuid) {
    let sender = worker_id.to_string();

    for progress in [25, 60] {
        tokio::time::sleep(Duration::from_millis(150)).await;
        bus.send_to_master(
            swarm_id,
            sender.clone(),
            MessagePayload::TaskProgress {
                task_id,
                progress,
                current_action: Some("processing".to_string()),
                step_index: None,
                total_steps: None,
            },
        )
        .await;
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    bus.send_to_master(
        swarm_id,
        sender,
        MessagePayload::TaskComplete {
            task_id,
            success: true,
            result: json!({ "status": "ok" }),
            metrics: TaskMetrics {
                duration_ms: 450,
                actions_performed: 3,
                pages_visited: 1,
                extra: std::collections::HashMap::new(),
            },
        },
    )
    .await;
}

#[must_use]
pub fn default_actuator() -> Arc<dyn Actuator> {
    Arc::new(DemoActuator)
}

#[must_use]
pub fn default_llm_provider() -> Arc<dyn LlmProvider> {
    Arc::new(DemoLlmProvider)
}

#[must_use]
pub fn default_synthesizer() -> Arc<dyn Synthesizer> {
    Arc::new(DemoSynthesizer)
}
