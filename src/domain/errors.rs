//! Top-level error aggregation for the swarm orchestration core.
//!
//! Each component that can fail defines its own `thiserror` enum scoped to
//! that component (mirroring `TaskError`/`DatabaseError`/`ClaudeApiError`
//! in the wider ecosystem this crate grew out of); `SwarmError` aggregates
//! them via `#[from]` for callers that want one propagation type. Public
//! API methods on the Service facade return `Result<T, ServiceError>`
//! directly so callers get the narrowest matchable type instead of having
//! to match through this enum.

use thiserror::Error;

use crate::application::swarm_service::ServiceError;
use crate::services::resilience::bulkhead::BulkheadError;
use crate::services::resilience::timeout::TimeoutError;
use crate::services::result_aggregator::AggregatorError;
use crate::services::swarm_orchestrator::CoordinatorError;
use crate::services::swarm_registry::RegistryError;
use crate::services::task_planner::PlannerError;
use crate::services::worker_lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Bulkhead(#[from] BulkheadError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type DomainResult<T> = Result<T, SwarmError>;
