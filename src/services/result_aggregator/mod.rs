//! Result Aggregator (C9): collects worker results from the Registry,
//! synthesizes one final value (batch path), and separately tracks a
//! live per-swarm buffer for incremental/streaming consumers.

pub mod format;
pub mod streaming;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::swarm::{SwarmResult, SwarmResultMetrics};
use crate::domain::models::worker::{Worker, WorkerState};
use crate::domain::models::WorkerResult;
use crate::domain::ports::synthesizer::Synthesizer;
use crate::services::swarm_registry::{RegistryError, SwarmRegistry};

pub use format::RenderFormat;
pub use streaming::{
    AggregatedStreamResult, CombinationMode, ConflictInfo, ConflictResolution, CustomMerger, ResultStream,
    StreamAggregationOptions, StreamChunk, StreamEvent, StreamStats,
};
use streaming::StreamState;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("all workers failed for swarm {swarm_id}: {errors}")]
    AllWorkersFailed { swarm_id: Uuid, errors: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("synthesizer failed: {0}")]
    Synthesis(#[source] anyhow::Error),
}

pub(crate) fn worker_result_of(worker: &Worker) -> Option<WorkerResult> {
    let result = worker.result.clone()?;
    Some(WorkerResult {
        worker_id: worker.id,
        task_id: worker.task.id,
        instruction: worker.task.instruction.clone(),
        result,
        confidence: worker
            .metrics
            .as_ref()
            .and_then(|m| m.extra.get("confidence"))
            .and_then(serde_json::Value::as_f64),
        metadata: HashMap::new(),
        completed_at: worker.completed_at.unwrap_or_else(Utc::now),
        duration_ms: worker.metrics.as_ref().map_or(0, |m| m.duration_ms),
    })
}

/// Truncates an instruction to a readable warning prefix for the
/// "truncated instruction: error" shape used in aggregation warnings.
fn truncate(instruction: &str, max_len: usize) -> String {
    if instruction.chars().count() <= max_len {
        instruction.to_string()
    } else {
        let truncated: String = instruction.chars().take(max_len).collect();
        format!("{truncated}...")
    }
}

pub struct ResultAggregator {
    registry: Arc<SwarmRegistry>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    streams: RwLock<HashMap<Uuid, StreamState>>,
}

impl ResultAggregator {
    #[must_use]
    pub fn new(registry: Arc<SwarmRegistry>, synthesizer: Option<Arc<dyn Synthesizer>>) -> Self {
        Self {
            registry,
            synthesizer,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Batch aggregation: pulls every completed/failed worker out of the
    /// Registry and synthesizes one final `SwarmResult`.
    pub async fn aggregate(&self, swarm_id: Uuid, format: RenderFormat) -> Result<SwarmResult, AggregatorError> {
        let swarm = self.registry.get(swarm_id).await?;

        let completed: Vec<&Worker> = swarm
            .workers
            .values()
            .filter(|w| w.state == WorkerState::Completed && w.result.is_some())
            .collect();
        let failed: Vec<&Worker> = swarm
            .workers
            .values()
            .filter(|w| matches!(w.state, WorkerState::Failed | WorkerState::Terminated))
            .collect();

        if completed.is_empty() {
            let errors = failed
                .iter()
                .map(|w| w.error.clone().unwrap_or_else(|| "no error recorded".to_string()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AggregatorError::AllWorkersFailed { swarm_id, errors });
        }

        let total_actions_performed: u64 = completed
            .iter()
            .filter_map(|w| w.metrics.as_ref())
            .map(|m| u64::from(m.actions_performed))
            .sum();

        let metrics = SwarmResultMetrics {
            total_duration_ms: swarm
                .started_at
                .map(|started| (Utc::now() - started).num_milliseconds().max(0) as u64)
                .unwrap_or(0),
            worker_count: swarm.workers.len() as u32,
            successful_workers: completed.len() as u32,
            failed_workers: failed.len() as u32,
            total_actions_performed,
        };

        let warnings: Vec<String> = failed
            .iter()
            .map(|w| {
                format!(
                    "{}: {}",
                    truncate(&w.task.instruction, 80),
                    w.error.clone().unwrap_or_else(|| "unknown error".to_string())
                )
            })
            .collect();

        let worker_results: Vec<WorkerResult> = completed.iter().filter_map(|w| worker_result_of(w)).collect();

        let result = if let Some(synthesizer) = &self.synthesizer {
            synthesizer
                .synthesize(&swarm.task, &worker_results, format_name(format))
                .await
                .map_err(AggregatorError::Synthesis)?
        } else {
            format::render(&worker_results, format)
        };

        Ok(SwarmResult {
            partial: !failed.is_empty(),
            warnings,
            result,
            metrics,
        })
    }

    /// Appends a worker's result to the swarm's live stream buffer and
    /// emits a chunk to any `ResultStream` subscribers.
    pub async fn process_result(&self, swarm_id: Uuid, wr: WorkerResult, total_workers: usize, emit_partials: bool) {
        let mut streams = self.streams.write().await;
        let state = streams.entry(swarm_id).or_default();
        streaming::process_result(state, swarm_id, wr, total_workers, emit_partials);
    }

    /// Subscribes to a swarm's stream of chunks; drop the returned
    /// `ResultStream` to cancel.
    pub async fn create_stream(&self, swarm_id: Uuid) -> ResultStream {
        let mut streams = self.streams.write().await;
        let state = streams.entry(swarm_id).or_default();
        streaming::create_stream(state)
    }

    pub async fn stream_stats(&self, swarm_id: Uuid) -> StreamStats {
        self.streams.read().await.get(&swarm_id).map(|s| s.stats.clone()).unwrap_or_default()
    }

    /// Finalizes a swarm's streamed results under `options`'s combination
    /// mode, publishes the terminal `aggregated` chunk, and returns it.
    pub async fn aggregate_stream(
        &self,
        swarm_id: Uuid,
        options: &StreamAggregationOptions,
    ) -> AggregatedStreamResult {
        let mut streams = self.streams.write().await;
        let state = streams.entry(swarm_id).or_default();
        let combined = streaming::combine(&state.results, options);
        state.conflicts = combined.conflicts.clone();
        streaming::publish_aggregated(state, swarm_id, combined.clone());
        combined
    }

    /// Drops a swarm's stream buffer; callers should do this once a
    /// swarm's final result has been delivered.
    pub async fn clear_stream(&self, swarm_id: Uuid) {
        self.streams.write().await.remove(&swarm_id);
    }
}

fn format_name(format: RenderFormat) -> &'static str {
    match format {
        RenderFormat::Json => "json",
        RenderFormat::Markdown => "markdown",
        RenderFormat::Html => "html",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::swarm::SwarmConfig;
    use crate::domain::models::worker_task::{TaskMetrics, WorkerTask};
    use async_trait::async_trait;

    struct UppercaseSynthesizer;

    #[async_trait]
    impl Synthesizer for UppercaseSynthesizer {
        async fn synthesize(
            &self,
            _task: &str,
            results: &[WorkerResult],
            _output_format: &str,
        ) -> anyhow::Result<serde_json::Value> {
            let joined: String = results
                .iter()
                .filter_map(|r| r.result.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Ok(serde_json::json!(joined.to_uppercase()))
        }
    }

    async fn setup_completed_swarm(registry: &SwarmRegistry) -> Uuid {
        let swarm = registry.create_swarm("summarize", SwarmConfig::default()).await.unwrap();
        let worker = registry.add_worker(swarm.id, WorkerTask::new("scrape page 1")).await.unwrap();
        registry.transition_swarm(swarm.id, crate::domain::models::swarm::SwarmState::Spawning).await.unwrap();
        registry.transition_swarm(swarm.id, crate::domain::models::swarm::SwarmState::Executing).await.unwrap();
        registry.transition_worker(swarm.id, worker.id, WorkerState::Spawning).await.unwrap();
        registry.transition_worker(swarm.id, worker.id, WorkerState::Running).await.unwrap();
        registry
            .set_worker_result(swarm.id, worker.id, serde_json::json!("done"), TaskMetrics::default())
            .await
            .unwrap();
        swarm.id
    }

    #[tokio::test]
    async fn aggregate_fails_when_no_workers_completed() {
        let registry = Arc::new(SwarmRegistry::new(3));
        let swarm = registry.create_swarm("task", SwarmConfig::default()).await.unwrap();
        let worker = registry.add_worker(swarm.id, WorkerTask::new("a")).await.unwrap();
        registry.transition_worker(swarm.id, worker.id, WorkerState::Spawning).await.unwrap();
        registry.set_worker_error(swarm.id, worker.id, "boom").await.unwrap();
        registry.transition_worker(swarm.id, worker.id, WorkerState::Failed).await.unwrap();

        let aggregator = ResultAggregator::new(registry, None);
        let result = aggregator.aggregate(swarm.id, RenderFormat::Json).await;
        assert!(matches!(result, Err(AggregatorError::AllWorkersFailed { .. })));
    }

    #[tokio::test]
    async fn aggregate_uses_external_synthesizer_when_present() {
        let registry = Arc::new(SwarmRegistry::new(3));
        let swarm_id = setup_completed_swarm(&registry).await;

        let aggregator = ResultAggregator::new(registry, Some(Arc::new(UppercaseSynthesizer)));
        let result = aggregator.aggregate(swarm_id, RenderFormat::Json).await.unwrap();
        assert_eq!(result.result, serde_json::json!("DONE"));
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn aggregate_marks_partial_when_any_worker_failed() {
        let registry = Arc::new(SwarmRegistry::new(3));
        let swarm_id = setup_completed_swarm(&registry).await;
        let failing = registry.add_worker(swarm_id, WorkerTask::new("scrape page 2")).await.unwrap();
        registry.transition_worker(swarm_id, failing.id, WorkerState::Spawning).await.unwrap();
        registry.set_worker_error(swarm_id, failing.id, "timed out").await.unwrap();
        registry.transition_worker(swarm_id, failing.id, WorkerState::Failed).await.unwrap();

        let aggregator = ResultAggregator::new(registry, None);
        let result = aggregator.aggregate(swarm_id, RenderFormat::Json).await.unwrap();
        assert!(result.partial);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn stream_processes_results_and_finalizes_with_vote_mode() {
        let registry = Arc::new(SwarmRegistry::new(3));
        let aggregator = ResultAggregator::new(registry, None);
        let swarm_id = Uuid::new_v4();

        let wr = WorkerResult {
            worker_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            instruction: "vote".to_string(),
            result: serde_json::json!("yes"),
            confidence: Some(1.0),
            metadata: HashMap::new(),
            completed_at: Utc::now(),
            duration_ms: 10,
        };
        aggregator.process_result(swarm_id, wr, 1, true).await;

        let options = StreamAggregationOptions {
            mode: CombinationMode::Vote,
            ..Default::default()
        };
        let combined = aggregator.aggregate_stream(swarm_id, &options).await;
        assert_eq!(combined.result, serde_json::json!("yes"));

        let stats = aggregator.stream_stats(swarm_id).await;
        assert_eq!(stats.total_chunks, 1);
    }
}
