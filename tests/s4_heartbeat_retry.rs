//! S4 — a worker stops heartbeating, the lifecycle retries it once, and
//! the retried attempt completes successfully, preserving the worker id.

mod common;

use std::sync::Arc;

use swarmcore::application::swarm_service::SwarmService;
use swarmcore::domain::models::swarm::{RetryPolicy, SwarmConfig};
use swarmcore::services::message_bus::MessageBus;
use swarmcore::services::result_aggregator::{RenderFormat, ResultAggregator};
use swarmcore::services::swarm_orchestrator::{SwarmCoordinator, TaskSource};
use swarmcore::services::swarm_registry::SwarmRegistry;
use swarmcore::services::tracer::{HealthRegistry, Tracer};
use swarmcore::services::worker_lifecycle::{LifecycleConfig, WorkerLifecycle};

use common::{CountingActuator, WorkerScript};

#[tokio::test]
async fn stalled_worker_retries_and_then_completes() {
    let registry = Arc::new(SwarmRegistry::new(3));
    let bus = MessageBus::new();
    let actuator = Arc::new(CountingActuator::new(false));
    // Short heartbeat cadence so the 300ms stall in `WorkerScript::StallThenSucceed`
    // comfortably crosses the timeout without a multi-second test.
    let lifecycle_config = LifecycleConfig { heartbeat_interval_ms: 20, heartbeat_timeout_ms: 60, progress_stale_ms: 10_000 };
    let worker_lifecycle = WorkerLifecycle::new(actuator, bus.clone(), Arc::clone(&registry), lifecycle_config);
    let aggregator = Arc::new(ResultAggregator::new(Arc::clone(&registry), None));
    // No planner call needed: manual source skips decomposition entirely.
    let planner = Arc::new(swarmcore::services::task_planner::TaskPlanner::new(Arc::new(NeverCalledLlm)));
    let coordinator = SwarmCoordinator::new(Arc::clone(&registry), planner, worker_lifecycle, bus.clone(), Arc::clone(&aggregator));
    let tracer = Arc::new(Tracer::new(1.0, HealthRegistry::new()));

    let service = SwarmService::new(Arc::clone(&registry), coordinator, aggregator, tracer, &Default::default(), None);

    common::simulate_workers(bus, service.subscribe_events(), vec![WorkerScript::StallThenSucceed]);

    let mut config = SwarmConfig::default();
    config.max_workers = 1;
    config.retry_policy = RetryPolicy { max_retries: 1, base_delay_ms: 10, max_delay_ms: 50, exponential_factor: 2.0 };
    let source = TaskSource::Manual(vec!["stall then succeed".to_string()]);

    let (swarm_id, mut stream) = service.execute_streaming("single flaky worker", config, source, RenderFormat::Json).await.unwrap();

    let mut aggregated = None;
    while let Some(event) = stream.next().await {
        if let swarmcore::application::swarm_service::ServiceStreamEvent::Aggregated(chunk) = event {
            aggregated = Some(chunk);
        }
    }
    let aggregated = aggregated.expect("swarm reached a terminal aggregated chunk");
    assert!(!aggregated.result.partial);

    let swarm = registry.get(swarm_id).await.unwrap();
    let worker = swarm.workers.values().next().expect("one worker");
    assert_eq!(worker.retry_count, 1);
}

struct NeverCalledLlm;

#[async_trait::async_trait]
impl swarmcore::domain::ports::llm_provider::LlmProvider for NeverCalledLlm {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("manual task source never calls the planner")
    }
}
