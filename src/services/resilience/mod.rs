//! Resilience Kit (C4): circuit breaker, bulkhead, retry, and timeout —
//! the four protective wrappers the Service facade composes around a
//! swarm execution call.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use bulkhead::{Bulkhead, BulkheadError, BulkheadPermit};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, CircuitStats};
pub use retry::{retry as retry_with_backoff, AlwaysRetry, ShouldRetry};
pub use timeout::{with_timeout, TimeoutError};
