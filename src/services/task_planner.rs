//! Task Planner (C7): decomposes a swarm task into `WorkerTask`s via an
//! LLM provider, or maps a caller-supplied list directly (manual
//! fallback, no LLM call).
//!
//! JSON extraction strips ` ```json `/` ``` ` code-fence wrappers before
//! parsing, since LLM providers routinely wrap structured output in a
//! markdown fence even when asked not to.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::WorkerTask;
use crate::domain::ports::llm_provider::LlmProvider;
use crate::services::dependency_resolver::DependencyResolver;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("task must not be empty")]
    EmptyTask,

    #[error("maxWorkers must be in [1, 10], got {0}")]
    InvalidMaxWorkers(u32),

    #[error("LLM decomposition failed: {0}")]
    DecompositionFailed(String),

    #[error("decomposition produced a circular dependency")]
    CyclicDependencies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Json,
    Markdown,
    Html,
}

#[derive(Debug, Clone)]
pub struct PlanningOptions {
    pub max_workers: u32,
    pub allow_dependencies: bool,
    pub output_format: OutputFormat,
}

impl Default for PlanningOptions {
    fn default() -> Self {
        Self {
            max_workers: 5,
            allow_dependencies: false,
            output_format: OutputFormat::Json,
        }
    }
}

/// Raw decomposition schema the LLM's response must match.
#[derive(Debug, Deserialize)]
struct DecompositionResponse {
    subtasks: Vec<RawSubtask>,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
    suggested_worker_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    instruction: String,
    #[serde(default)]
    start_url: Option<String>,
    #[serde(default)]
    estimated_duration_minutes: Option<u64>,
    #[serde(default)]
    dependencies: Vec<String>,
}

pub struct TaskPlanner {
    llm: Arc<dyn LlmProvider>,
}

impl TaskPlanner {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn decompose(&self, task: &str, options: &PlanningOptions) -> Result<Vec<WorkerTask>, PlannerError> {
        if task.trim().is_empty() {
            return Err(PlannerError::EmptyTask);
        }
        if !(1..=10).contains(&options.max_workers) {
            return Err(PlannerError::InvalidMaxWorkers(options.max_workers));
        }

        let prompt = build_prompt(task, options);
        let response = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| PlannerError::DecompositionFailed(e.to_string()))?;

        let json = extract_json(&response);
        let decomposition: DecompositionResponse =
            serde_json::from_str(&json).map_err(|e| PlannerError::DecompositionFailed(format!("{e}: {json}")))?;

        if decomposition.subtasks.is_empty() {
            return Err(PlannerError::DecompositionFailed("decomposition produced no subtasks".to_string()));
        }
        if let Some(count) = decomposition.suggested_worker_count {
            if !(1..=10).contains(&count) {
                return Err(PlannerError::DecompositionFailed(format!("suggestedWorkerCount must be in [1, 10], got {count}")));
            }
        }

        let tasks = self.to_worker_tasks(decomposition.subtasks, options.max_workers);

        if options.allow_dependencies && DependencyResolver::new().detect_cycle(&tasks).is_some() {
            return Err(PlannerError::CyclicDependencies);
        }

        Ok(tasks)
    }

    /// Turns a caller-supplied instruction list into `WorkerTask`s with
    /// fresh ids — no LLM call, used when the caller already knows the
    /// decomposition.
    #[must_use]
    pub fn from_manual_list(instructions: Vec<String>, max_workers: u32) -> Vec<WorkerTask> {
        instructions
            .into_iter()
            .take(max_workers as usize)
            .map(WorkerTask::new)
            .collect()
    }

    fn to_worker_tasks(&self, subtasks: Vec<RawSubtask>, max_workers: u32) -> Vec<WorkerTask> {
        let ids: Vec<Uuid> = subtasks.iter().map(|_| Uuid::new_v4()).collect();
        let id_by_instruction: std::collections::HashMap<&str, Uuid> = subtasks
            .iter()
            .zip(&ids)
            .map(|(raw, id)| (raw.instruction.as_str(), *id))
            .collect();

        let mut tasks: Vec<WorkerTask> = subtasks
            .iter()
            .zip(&ids)
            .map(|(raw, &id)| {
                let mut task = WorkerTask::new(raw.instruction.clone());
                task.id = id;
                if let Some(url) = &raw.start_url {
                    task = task.with_start_url(url.clone());
                }
                if let Some(minutes) = raw.estimated_duration_minutes {
                    task = task.with_timeout_ms(minutes * 60 * 1000);
                }
                let dependencies: Vec<Uuid> = raw
                    .dependencies
                    .iter()
                    .filter_map(|instruction| id_by_instruction.get(instruction.as_str()).copied())
                    .collect();
                if !dependencies.is_empty() {
                    task = task.with_dependencies(dependencies);
                }
                task
            })
            .collect();

        tasks.truncate(max_workers as usize);
        tasks
    }
}

fn build_prompt(task: &str, options: &PlanningOptions) -> String {
    format!(
        "Decompose the following task into independent worker subtasks.\n\
         Task: {task}\n\
         Maximum workers: {max_workers}\n\
         Dependencies allowed: {allow_dependencies}\n\
         Output format: {output_format:?}\n\n\
         Respond with pure JSON matching:\n\
         {{ \"subtasks\": [{{ \"instruction\": string, \"startUrl\"?: string, \
         \"estimatedDurationMinutes\"?: number, \"dependencies\"?: [string] }}], \
         \"reasoning\": string, \"suggestedWorkerCount\": number (1-10) }}",
        max_workers = options.max_workers,
        allow_dependencies = options.allow_dependencies,
        output_format = options.output_format,
    )
}

/// Strips ` ```json `/` ``` ` code-fence wrappers before parsing.
fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }

    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }

    trimmed.to_string()
}
