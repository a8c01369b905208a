//! Bridges `SwarmCoordinator` events into the Result Aggregator's
//! streaming buffer so `SwarmService::execute_streaming` can hand callers
//! a chunk-by-chunk view of a swarm that the Coordinator's batch-only
//! `aggregate()` call doesn't produce on its own.

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::WorkerResult;
use crate::services::result_aggregator::{ResultStream, StreamAggregationOptions, StreamEvent};
use crate::services::swarm_orchestrator::{SwarmEvent, TaskSource};

use super::SwarmService;

/// One chunk-or-terminal event from a streamed swarm execution.
pub enum ServiceStreamEvent {
    Chunk(crate::services::result_aggregator::StreamChunk),
    Aggregated(crate::services::result_aggregator::AggregatedChunk),
}

/// Consumer handle for a swarm started with `execute_streaming`. Wraps
/// the aggregator's `ResultStream` and stops yielding once the terminal
/// `aggregated` chunk has been observed.
pub struct ServiceStream {
    swarm_id: Uuid,
    inner: ResultStream,
    aggregator: Arc<crate::services::result_aggregator::ResultAggregator>,
    done: bool,
}

impl ServiceStream {
    pub(super) fn new(
        swarm_id: Uuid,
        inner: ResultStream,
        aggregator: Arc<crate::services::result_aggregator::ResultAggregator>,
    ) -> Self {
        Self {
            swarm_id,
            inner,
            aggregator,
            done: false,
        }
    }

    pub async fn next(&mut self) -> Option<ServiceStreamEvent> {
        if self.done {
            return None;
        }
        match self.inner.next().await {
            Some(StreamEvent::Chunk(chunk)) => Some(ServiceStreamEvent::Chunk(chunk)),
            Some(StreamEvent::Aggregated(chunk)) => {
                self.done = true;
                self.aggregator.clear_stream(self.swarm_id).await;
                Some(ServiceStreamEvent::Aggregated(chunk))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Runs the swarm in the background, translating `WorkerCompleted` events
/// into `process_result` calls and finalizing the stream once the swarm
/// reaches a terminal state.
pub(super) fn spawn_bridge(service: Arc<SwarmService>, swarm_id: Uuid, source: TaskSource, format: crate::services::result_aggregator::RenderFormat) {
    let mut events = service.coordinator.subscribe_events();
    let bridge = Arc::clone(&service);
    tokio::spawn(async move {
        tokio::join!(
            async {
                let _ = bridge.coordinator.execute_existing(swarm_id, source, format).await;
            },
            async {
                loop {
                    match events.recv().await {
                        Ok(event) if event.swarm_id() == swarm_id => {
                            if handle_event(&bridge, swarm_id, &event).await {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        );
    });
}

/// Applies one coordinator event to the streaming buffer; returns `true`
/// once the swarm has reached a terminal state and the bridge can stop.
async fn handle_event(service: &Arc<SwarmService>, swarm_id: Uuid, event: &SwarmEvent) -> bool {
    match event {
        SwarmEvent::WorkerCompleted { worker_id, .. } => {
            if let Ok(worker) = service.registry.get_worker(swarm_id, *worker_id).await {
                if let Some(result) = crate::services::result_aggregator::worker_result_of(&worker) {
                    let total = service.registry.get(swarm_id).await.map(|s| s.workers.len()).unwrap_or(1);
                    let wr: WorkerResult = result;
                    service.aggregator.process_result(swarm_id, wr, total.max(1), true).await;
                }
            }
            false
        }
        SwarmEvent::SwarmCompleted { .. } | SwarmEvent::SwarmFailed { .. } => {
            service.aggregator.aggregate_stream(swarm_id, &StreamAggregationOptions::default()).await;
            true
        }
        _ => false,
    }
}
