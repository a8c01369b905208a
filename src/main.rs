//! Demo CLI entry point: decomposes a task, runs it across simulated
//! workers, and prints the aggregated result.

mod cli;
mod demos;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use swarmcore::application::swarm_service::SwarmService;
use swarmcore::domain::models::swarm::SwarmConfig;
use swarmcore::infrastructure::config::ConfigLoader;
use swarmcore::infrastructure::logging::LoggerImpl;
use swarmcore::services::message_bus::MessageBus;
use swarmcore::services::result_aggregator::{RenderFormat, ResultAggregator};
use swarmcore::services::swarm_orchestrator::{SwarmCoordinator, SwarmEvent, TaskSource};
use swarmcore::services::swarm_registry::SwarmRegistry;
use swarmcore::services::task_planner::{OutputFormat, PlanningOptions, TaskPlanner};
use swarmcore::services::tracer::{HealthCheck, HealthRegistry, Tracer};
use swarmcore::services::worker_lifecycle::{LifecycleConfig, WorkerLifecycle};

use cli::output::{progress::create_swarm_progress, render};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration file")?,
        None => ConfigLoader::load().context("failed to load configuration")?,
    };

    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logging")?;

    let registry = Arc::new(SwarmRegistry::new(config.max_concurrent_swarms));
    let bus = MessageBus::new();
    let planner = Arc::new(TaskPlanner::new(demos::default_llm_provider()));
    let worker_lifecycle = WorkerLifecycle::new(
        demos::default_actuator(),
        bus.clone(),
        Arc::clone(&registry),
        LifecycleConfig {
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            heartbeat_timeout_ms: config.heartbeat_timeout_ms,
            progress_stale_ms: config.progress_stale_ms,
        },
    );
    let aggregator = Arc::new(ResultAggregator::new(Arc::clone(&registry), Some(demos::default_synthesizer())));
    let coordinator = SwarmCoordinator::new(Arc::clone(&registry), planner, worker_lifecycle, bus.clone(), Arc::clone(&aggregator));

    let mut health = HealthRegistry::new();
    health.register(HealthCheck::new("message_bus", true, Arc::new(|| Box::pin(async { Ok(()) }))));
    let tracer = Arc::new(Tracer::new(1.0, health));

    let service = SwarmService::new(
        Arc::clone(&registry),
        coordinator,
        aggregator,
        tracer,
        &config.bulkhead,
        Some(&config.circuit_breaker),
    );

    match cli.command {
        Commands::Run { task, max_workers, instructions } => run(&service, &bus, task, max_workers, instructions, cli.json).await,
        Commands::Health => {
            let report = service.health().await;
            render(&report, cli.json);
            Ok(())
        }
    }
}

async fn run(service: &Arc<SwarmService>, bus: &MessageBus, task: String, max_workers: u32, instructions: Vec<String>, json: bool) -> Result<()> {
    demos::simulate_workers(bus.clone(), service.subscribe_events());

    let mut progress_events = service.subscribe_events();
    let pb = create_swarm_progress(0);
    let progress_handle = tokio::spawn(async move {
        loop {
            match progress_events.recv().await {
                Ok(SwarmEvent::SwarmStarted { worker_count, .. }) => pb.set_length(worker_count as u64),
                Ok(SwarmEvent::WorkerCompleted { .. }) => pb.inc(1),
                Ok(SwarmEvent::WorkerFailed { .. }) => pb.inc(1),
                Ok(SwarmEvent::SwarmCompleted { .. } | SwarmEvent::SwarmFailed { .. }) => {
                    pb.finish_and_clear();
                    return;
                }
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    });

    let mut config = SwarmConfig::default();
    config.max_workers = max_workers;

    let source = if instructions.is_empty() {
        TaskSource::Decompose(PlanningOptions {
            max_workers,
            allow_dependencies: false,
            output_format: OutputFormat::Json,
        })
    } else {
        TaskSource::Manual(instructions)
    };

    let result = service.execute(task, config, source, RenderFormat::Json).await;
    progress_handle.abort();

    match result {
        Ok(result) => {
            render(&result, json);
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
