//! Swarm Service facade (C12): the single admission point external
//! callers go through. Wraps `SwarmCoordinator::execute` in the
//! Resilience Kit's bulkhead (and, if configured, a circuit breaker),
//! forwards coordinator events under one `swarm_event` channel, and
//! exposes `Tracer` (C11) read paths alongside the execution API.
//!
//! One facade struct holding `Arc`s to every component plus the two
//! resilience primitives, constructed once from `SwarmServiceConfig` and
//! cloned cheaply per caller.

mod streaming;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::swarm::{SwarmConfig, SwarmResult};
use crate::infrastructure::config::{BulkheadSettings, CircuitBreakerSettings};
use crate::services::resilience::{Bulkhead, BulkheadError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitStats};
use crate::services::result_aggregator::{AggregatorError, RenderFormat, ResultAggregator};
use crate::services::swarm_orchestrator::{CoordinatorError, SwarmCoordinator, SwarmEvent, TaskSource};
use crate::services::swarm_registry::{RegistryError, SwarmRegistry, SwarmStatus};
use crate::services::tracer::{HealthReport, MetricsWindow, Tracer};

pub use streaming::{ServiceStream, ServiceStreamEvent};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error("rejected by bulkhead: {0}")]
    Bulkhead(#[from] BulkheadError),

    #[error("circuit is open: {stats:?}")]
    CircuitOpen { stats: CircuitStats },
}

impl From<CircuitBreakerError<CoordinatorError>> for ServiceError {
    fn from(err: CircuitBreakerError<CoordinatorError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { stats } => Self::CircuitOpen { stats },
            CircuitBreakerError::Inner(inner) => Self::Coordinator(inner),
        }
    }
}

/// Wires the twelve components behind one handle. `LoadBalancer` (C3) and
/// `WorkerPool` (C5) aren't constructed here: `WorkerLifecycle` spawns one
/// fresh actuator session per worker directly, so neither the
/// routing-among-many-workers strategies C3 implements nor C5's
/// warm-pool reuse have a caller in the default execution path. Both
/// remain available as standalone components for callers that build
/// their own worker-pooling actuator; see `DESIGN.md`.
pub struct SwarmService {
    registry: Arc<SwarmRegistry>,
    coordinator: Arc<SwarmCoordinator>,
    aggregator: Arc<ResultAggregator>,
    tracer: Arc<Tracer>,
    bulkhead: Bulkhead,
    circuit_breaker: Option<CircuitBreaker>,
}

impl SwarmService {
    #[must_use]
    pub fn new(
        registry: Arc<SwarmRegistry>,
        coordinator: Arc<SwarmCoordinator>,
        aggregator: Arc<ResultAggregator>,
        tracer: Arc<Tracer>,
        bulkhead_settings: &BulkheadSettings,
        circuit_breaker_settings: Option<&CircuitBreakerSettings>,
    ) -> Arc<Self> {
        let bulkhead = Bulkhead::new(
            bulkhead_settings.max_concurrent as usize,
            bulkhead_settings.max_queue as usize,
            Duration::from_millis(bulkhead_settings.queue_timeout_ms),
        );
        let circuit_breaker = circuit_breaker_settings.map(|settings| {
            CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: settings.failure_threshold,
                failure_window_ms: settings.failure_window_ms,
                reset_timeout_ms: settings.reset_timeout_ms,
                half_open_max_calls: settings.half_open_max_calls,
                success_threshold: settings.success_threshold,
            })
        });

        Arc::new(Self {
            registry,
            coordinator,
            aggregator,
            tracer,
            bulkhead,
            circuit_breaker,
        })
    }

    /// Forwards every `SwarmEvent` the Coordinator emits, across all
    /// swarms this service drives, under one channel.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SwarmEvent> {
        self.coordinator.subscribe_events()
    }

    /// Runs one swarm to completion through the bulkhead (and circuit
    /// breaker, if configured), returning its synthesized `SwarmResult`.
    pub async fn execute(
        &self,
        task: impl Into<String>,
        config: SwarmConfig,
        source: TaskSource,
        format: RenderFormat,
    ) -> Result<SwarmResult, ServiceError> {
        let _permit = self.bulkhead.acquire().await?;
        let task = task.into();
        self.call_coordinator(|| self.coordinator.execute(task, config, source, format)).await
    }

    async fn call_coordinator<F, Fut>(&self, f: F) -> Result<SwarmResult, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<SwarmResult, CoordinatorError>>,
    {
        match &self.circuit_breaker {
            Some(breaker) => breaker.call(f, None).await.map_err(ServiceError::from),
            None => f().await.map_err(ServiceError::from),
        }
    }

    /// Starts a swarm and returns its id plus a `ServiceStream` of
    /// incremental chunks, bridging the Coordinator's `WorkerCompleted`
    /// events into the Result Aggregator's streaming buffer (C9) as they
    /// arrive, then publishing the terminal aggregated chunk once the
    /// swarm reaches a terminal state. See `DESIGN.md` for why this
    /// bridge lives in the facade rather than the Coordinator itself.
    pub async fn execute_streaming(
        self: &Arc<Self>,
        task: impl Into<String>,
        config: SwarmConfig,
        source: TaskSource,
        format: RenderFormat,
    ) -> Result<(Uuid, ServiceStream), ServiceError> {
        let task = task.into();
        let swarm = self.registry.create_swarm(task, config).await?;
        let result_stream = self.aggregator.create_stream(swarm.id).await;

        let service = Arc::clone(self);
        streaming::spawn_bridge(service, swarm.id, source, format);

        Ok((swarm.id, ServiceStream::new(swarm.id, result_stream, Arc::clone(&self.aggregator))))
    }

    /// Cancels an in-flight swarm.
    pub async fn terminate(&self, swarm_id: Uuid) -> Result<(), ServiceError> {
        self.coordinator.terminate_swarm(swarm_id).await?;
        Ok(())
    }

    pub async fn status(&self, swarm_id: Uuid) -> Result<SwarmStatus, ServiceError> {
        Ok(self.coordinator.status(swarm_id).await?)
    }

    pub async fn metrics(&self, swarm_id: Uuid) -> MetricsWindow {
        self.tracer.metrics_window(swarm_id).await
    }

    pub async fn trace(&self, trace_id: Uuid) -> Vec<crate::domain::models::span::Span> {
        self.tracer.trace(trace_id).await
    }

    pub async fn health(&self) -> HealthReport {
        self.tracer.health().await
    }
}
