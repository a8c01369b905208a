//! Domain models for the swarm orchestration core.

pub mod capacity;
pub mod message;
pub mod pool;
pub mod queue;
pub mod span;
pub mod swarm;
pub mod worker;
pub mod worker_result;
pub mod worker_task;

pub use capacity::WorkerCapacity;
pub use message::{CoordinationAction, Message, MessagePayload, TargetId, wiretap_channel};
pub use pool::{PooledWorker, PooledWorkerState};
pub use queue::{Priority, ScheduledTask};
pub use span::{Span, SpanEvent, SpanKind, SpanLink, SpanStatus};
pub use swarm::{
    CpuPriority, ResourceLimits, RetryPolicy, Swarm, SwarmConfig, SwarmResult, SwarmResultMetrics,
    SwarmState,
};
pub use worker::{Worker, WorkerState};
pub use worker_result::WorkerResult;
pub use worker_task::{TaskMetrics, WorkerTask};
