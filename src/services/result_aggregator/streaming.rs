//! Streaming aggregation: per-swarm result buffers, a chunk broadcast
//! (mirrors `message_bus`'s per-channel `broadcast::Sender` shape), and
//! the merge/concat/vote/custom combination modes for the final
//! `aggregate` call over a swarm's accumulated stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::WorkerResult;

const CHUNK_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub swarm_id: Uuid,
    pub worker_id: Uuid,
    pub task_id: Uuid,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub progress: u8,
    pub total_workers: usize,
    pub completed_workers: usize,
}

/// Sent once a swarm's stream aggregation is finalized; a consumer of
/// `ResultStream` treats this as the signal to stop polling.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedChunk {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub swarm_id: Uuid,
    pub result: AggregatedStreamResult,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct StreamStats {
    pub first_result_at: Option<DateTime<Utc>>,
    pub last_result_at: Option<DateTime<Utc>>,
    pub total_chunks: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    First,
    Last,
    Majority,
    HighestConfidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictInfo {
    pub key: String,
    pub values: Vec<Value>,
    pub resolved: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationMode {
    Merge,
    Concat,
    Vote,
    Custom,
}

pub type CustomMerger = Arc<dyn Fn(&[WorkerResult]) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct StreamAggregationOptions {
    pub mode: CombinationMode,
    pub conflict_resolution: ConflictResolution,
    pub min_vote_confidence: f64,
    pub custom_merger: Option<CustomMerger>,
}

impl Default for StreamAggregationOptions {
    fn default() -> Self {
        Self {
            mode: CombinationMode::Merge,
            conflict_resolution: ConflictResolution::Last,
            min_vote_confidence: 0.5,
            custom_merger: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedStreamResult {
    pub result: Value,
    pub partial: bool,
    pub warnings: Vec<String>,
    pub conflicts: Vec<ConflictInfo>,
    pub votes: Option<HashMap<String, f64>>,
    pub confidence: Option<f64>,
}

/// One swarm's accumulated streaming state: results seen so far, running
/// stats, and any conflicts noted by a prior `aggregate` call.
#[derive(Default)]
pub struct StreamState {
    pub results: Vec<WorkerResult>,
    pub stats: StreamStats,
    pub conflicts: Vec<ConflictInfo>,
    sender: Option<broadcast::Sender<StreamChunk>>,
    aggregated_sender: Option<broadcast::Sender<AggregatedChunk>>,
}

impl StreamState {
    fn chunk_sender(&mut self) -> broadcast::Sender<StreamChunk> {
        self.sender
            .get_or_insert_with(|| broadcast::channel(CHUNK_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn aggregated_sender(&mut self) -> broadcast::Sender<AggregatedChunk> {
        self.aggregated_sender
            .get_or_insert_with(|| broadcast::channel(CHUNK_CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// Handle returned by `createStream`. Dropping it unsubscribes; the
/// consumer polls `next()` until it sees an `aggregated` kind or the
/// channel closes.
pub struct ResultStream {
    chunks: broadcast::Receiver<StreamChunk>,
    aggregated: broadcast::Receiver<AggregatedChunk>,
}

pub enum StreamEvent {
    Chunk(StreamChunk),
    Aggregated(AggregatedChunk),
}

impl ResultStream {
    pub async fn next(&mut self) -> Option<StreamEvent> {
        tokio::select! {
            biased;
            result = self.aggregated.recv() => match result {
                Ok(chunk) => Some(StreamEvent::Aggregated(chunk)),
                Err(_) => None,
            },
            result = self.chunks.recv() => match result {
                Ok(chunk) => Some(StreamEvent::Chunk(chunk)),
                Err(_) => None,
            },
        }
    }
}

pub(super) fn create_stream(state: &mut StreamState) -> ResultStream {
    ResultStream {
        chunks: state.chunk_sender().subscribe(),
        aggregated: state.aggregated_sender().subscribe(),
    }
}

/// Appends `wr` to the swarm's buffer, refreshes stats, and (when a
/// `ResultStream` is listening) emits a progress/partial chunk.
pub(super) fn process_result(
    state: &mut StreamState,
    swarm_id: Uuid,
    wr: WorkerResult,
    total_workers: usize,
    emit_partials: bool,
) {
    let now = wr.completed_at;
    state.stats.first_result_at.get_or_insert(now);
    state.stats.last_result_at = Some(now);
    state.stats.total_chunks += 1;

    let latencies_sum = state.stats.avg_latency_ms * (state.stats.total_chunks - 1) as f64;
    state.stats.avg_latency_ms = (latencies_sum + wr.duration_ms as f64) / state.stats.total_chunks as f64;

    let chunk = StreamChunk {
        kind: if emit_partials { "partial" } else { "progress" },
        swarm_id,
        worker_id: wr.worker_id,
        task_id: wr.task_id,
        data: emit_partials.then(|| wr.result.clone()),
        timestamp: now,
        progress: 100,
        total_workers,
        completed_workers: state.results.len() + 1,
    };

    state.results.push(wr);
    if let Some(sender) = &state.sender {
        let _ = sender.send(chunk);
    }
}

/// Publishes the terminal `aggregated` event for this swarm's stream —
/// the event a streaming consumer waits on before treating the swarm as
/// fully observed.
pub(super) fn publish_aggregated(state: &mut StreamState, swarm_id: Uuid, result: AggregatedStreamResult) {
    let chunk = AggregatedChunk {
        kind: "aggregated",
        swarm_id,
        result,
    };
    if let Some(sender) = &state.aggregated_sender {
        let _ = sender.send(chunk);
    }
}

pub(super) fn combine(results: &[WorkerResult], options: &StreamAggregationOptions) -> AggregatedStreamResult {
    match options.mode {
        CombinationMode::Concat => combine_concat(results),
        CombinationMode::Vote => combine_vote(results, options.min_vote_confidence),
        CombinationMode::Custom => combine_custom(results, options.custom_merger.as_ref()),
        CombinationMode::Merge => combine_merge(results, options.conflict_resolution),
    }
}

fn combine_concat(results: &[WorkerResult]) -> AggregatedStreamResult {
    let entries: Vec<Value> = results
        .iter()
        .map(|wr| {
            serde_json::json!({
                "task": wr.instruction,
                "result": wr.result,
                "workerId": wr.worker_id,
                "durationMs": wr.duration_ms,
            })
        })
        .collect();

    AggregatedStreamResult {
        result: Value::Array(entries),
        partial: false,
        warnings: Vec::new(),
        conflicts: Vec::new(),
        votes: None,
        confidence: None,
    }
}

fn combine_vote(results: &[WorkerResult], min_vote_confidence: f64) -> AggregatedStreamResult {
    let mut weights: HashMap<String, f64> = HashMap::new();
    for wr in results {
        let bucket = serde_json::to_string(&wr.result).unwrap_or_default();
        *weights.entry(bucket).or_insert(0.0) += wr.confidence.unwrap_or(1.0);
    }

    let total_weight: f64 = weights.values().sum();
    let winner = weights
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(bucket, weight)| (bucket.clone(), *weight));

    let Some((winning_bucket, winning_weight)) = winner else {
        return AggregatedStreamResult {
            result: Value::Null,
            partial: true,
            warnings: vec!["no worker results to vote over".to_string()],
            conflicts: Vec::new(),
            votes: Some(weights),
            confidence: None,
        };
    };

    let confidence = if total_weight > 0.0 { winning_weight / total_weight } else { 0.0 };
    let mut warnings = Vec::new();
    if confidence < min_vote_confidence {
        warnings.push(format!(
            "winning vote confidence {confidence:.2} is below the minimum {min_vote_confidence:.2}"
        ));
    }

    let result: Value = serde_json::from_str(&winning_bucket).unwrap_or(Value::Null);
    AggregatedStreamResult {
        result,
        partial: false,
        warnings,
        conflicts: Vec::new(),
        votes: Some(weights),
        confidence: Some(confidence),
    }
}

fn combine_custom(results: &[WorkerResult], merger: Option<&CustomMerger>) -> AggregatedStreamResult {
    let result = merger.map_or(Value::Null, |merger| merger(results));
    AggregatedStreamResult {
        result,
        partial: false,
        warnings: Vec::new(),
        conflicts: Vec::new(),
        votes: None,
        confidence: None,
    }
}

fn combine_merge(results: &[WorkerResult], resolution: ConflictResolution) -> AggregatedStreamResult {
    let mut merged = serde_json::Map::new();
    let mut per_key_contributions: HashMap<String, Vec<(&WorkerResult, Value)>> = HashMap::new();

    for wr in results {
        if let Value::Object(map) = &wr.result {
            for (key, value) in map {
                per_key_contributions
                    .entry(key.clone())
                    .or_default()
                    .push((wr, value.clone()));
            }
        }
    }

    let mut conflicts = Vec::new();
    for (key, contributions) in &per_key_contributions {
        let distinct: Vec<&Value> = {
            let mut seen = Vec::new();
            for (_, value) in contributions {
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
            seen
        };

        let resolved = if distinct.len() <= 1 {
            contributions[0].1.clone()
        } else {
            let picked = resolve_conflict(contributions, resolution);
            conflicts.push(ConflictInfo {
                key: key.clone(),
                values: contributions.iter().map(|(_, v)| v.clone()).collect(),
                resolved: picked.clone(),
            });
            picked
        };

        merged.insert(key.clone(), resolved);
    }

    AggregatedStreamResult {
        result: Value::Object(merged),
        partial: false,
        warnings: Vec::new(),
        conflicts,
        votes: None,
        confidence: None,
    }
}

fn resolve_conflict(contributions: &[(&WorkerResult, Value)], resolution: ConflictResolution) -> Value {
    match resolution {
        ConflictResolution::First => contributions.first().map(|(_, v)| v.clone()).unwrap_or(Value::Null),
        ConflictResolution::Last => contributions.last().map(|(_, v)| v.clone()).unwrap_or(Value::Null),
        ConflictResolution::Majority => {
            let mut counts: Vec<(&Value, usize)> = Vec::new();
            for (_, value) in contributions {
                if let Some(entry) = counts.iter_mut().find(|(v, _)| *v == value) {
                    entry.1 += 1;
                } else {
                    counts.push((value, 1));
                }
            }
            counts
                .into_iter()
                .max_by_key(|(_, count)| *count)
                .map(|(value, _)| value.clone())
                .unwrap_or(Value::Null)
        }
        ConflictResolution::HighestConfidence => contributions
            .iter()
            .max_by(|(a, _), (b, _)| {
                a.confidence
                    .unwrap_or(0.0)
                    .partial_cmp(&b.confidence.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn wr(result: Value, confidence: Option<f64>) -> WorkerResult {
        WorkerResult {
            worker_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            instruction: "do it".to_string(),
            result,
            confidence,
            metadata: Default::default(),
            completed_at: Utc::now(),
            duration_ms: 50,
        }
    }

    #[test]
    fn merge_resolves_conflicting_key_by_highest_confidence() {
        let results = vec![
            wr(serde_json::json!({"title": "A"}), Some(0.3)),
            wr(serde_json::json!({"title": "B"}), Some(0.9)),
        ];
        let combined = combine_merge(&results, ConflictResolution::HighestConfidence);
        assert_eq!(combined.result["title"], "B");
        assert_eq!(combined.conflicts.len(), 1);
    }

    #[test]
    fn merge_leaves_non_conflicting_keys_untouched() {
        let results = vec![
            wr(serde_json::json!({"a": 1}), None),
            wr(serde_json::json!({"b": 2}), None),
        ];
        let combined = combine_merge(&results, ConflictResolution::Last);
        assert_eq!(combined.result["a"], 1);
        assert_eq!(combined.result["b"], 2);
        assert!(combined.conflicts.is_empty());
    }

    #[test]
    fn vote_picks_max_weight_bucket_and_computes_confidence() {
        let results = vec![
            wr(serde_json::json!("yes"), Some(1.0)),
            wr(serde_json::json!("yes"), Some(1.0)),
            wr(serde_json::json!("no"), Some(1.0)),
        ];
        let combined = combine_vote(&results, 0.5);
        assert_eq!(combined.result, serde_json::json!("yes"));
        assert!((combined.confidence.unwrap() - (2.0 / 3.0)).abs() < 1e-9);
        assert!(combined.warnings.is_empty());
    }

    #[test]
    fn vote_below_min_confidence_still_returns_winner_with_warning() {
        let results = vec![
            wr(serde_json::json!("yes"), Some(1.0)),
            wr(serde_json::json!("no"), Some(1.0)),
        ];
        let combined = combine_vote(&results, 0.9);
        assert_eq!(combined.result, serde_json::json!("yes"));
        assert_eq!(combined.warnings.len(), 1);
    }

    #[test]
    fn concat_preserves_each_worker_as_its_own_entry() {
        let results = vec![wr(serde_json::json!({"x": 1}), None), wr(serde_json::json!({"x": 2}), None)];
        let combined = combine_concat(&results);
        assert_eq!(combined.result.as_array().unwrap().len(), 2);
    }
}
