//! S2 — partial failure: one of three workers reports `task_failed`.

mod common;

use std::sync::Arc;

use swarmcore::application::swarm_service::SwarmService;
use swarmcore::domain::models::swarm::SwarmConfig;
use swarmcore::services::message_bus::MessageBus;
use swarmcore::services::result_aggregator::{RenderFormat, ResultAggregator};
use swarmcore::services::swarm_orchestrator::{SwarmCoordinator, TaskSource};
use swarmcore::services::swarm_registry::SwarmRegistry;
use swarmcore::services::task_planner::{OutputFormat, PlanningOptions, TaskPlanner};
use swarmcore::services::tracer::{HealthRegistry, Tracer};
use swarmcore::services::worker_lifecycle::{LifecycleConfig, WorkerLifecycle};

use common::{CountingActuator, FixedDecompositionLlm, WorkerScript};

#[tokio::test]
async fn one_worker_failing_yields_a_partial_result_with_a_warning() {
    let registry = Arc::new(SwarmRegistry::new(3));
    let bus = MessageBus::new();
    let planner = Arc::new(TaskPlanner::new(Arc::new(FixedDecompositionLlm::new(vec!["crm a", "crm b", "crm c"]))));
    let actuator = Arc::new(CountingActuator::new(false));
    let worker_lifecycle = WorkerLifecycle::new(actuator, bus.clone(), Arc::clone(&registry), LifecycleConfig::default());
    let aggregator = Arc::new(ResultAggregator::new(Arc::clone(&registry), None));
    let coordinator = SwarmCoordinator::new(Arc::clone(&registry), planner, worker_lifecycle, bus.clone(), Arc::clone(&aggregator));
    let tracer = Arc::new(Tracer::new(1.0, HealthRegistry::new()));

    let service = SwarmService::new(registry, coordinator, aggregator, tracer, &Default::default(), None);

    common::simulate_workers(
        bus,
        service.subscribe_events(),
        vec![WorkerScript::Succeed, WorkerScript::Fail("captcha"), WorkerScript::Succeed],
    );

    let mut config = SwarmConfig::default();
    config.max_workers = 3;
    let source = TaskSource::Decompose(PlanningOptions { max_workers: 3, allow_dependencies: false, output_format: OutputFormat::Markdown });

    let result = service.execute("Compare three CRMs", config, source, RenderFormat::Markdown).await.unwrap();

    assert!(result.partial);
    assert_eq!(result.metrics.failed_workers, 1);
    assert_eq!(result.metrics.successful_workers, 2);
    assert!(result.warnings.iter().any(|w| w.contains("captcha")));
    let markdown = result.result.as_str().expect("markdown result is a string");
    assert!(markdown.contains("## crm a"));
    assert!(markdown.contains("## crm c"));
    assert!(!markdown.contains("## crm b"));
}
