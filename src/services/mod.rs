//! Service layer: eleven of the twelve components the swarm orchestration
//! core is built from (C1-C11). Each submodule owns one component's state
//! and exposes it as a small async API. The twelfth, the Swarm Service
//! façade that wires these together for external callers, lives in
//! `crate::application::swarm_service`.

pub mod dependency_resolver;
pub mod load_balancer;
pub mod message_bus;
pub mod priority_queue;
pub mod resilience;
pub mod result_aggregator;
pub mod swarm_orchestrator;
pub mod swarm_registry;
pub mod task_planner;
pub mod tracer;
pub mod worker_lifecycle;
pub mod worker_pool;
