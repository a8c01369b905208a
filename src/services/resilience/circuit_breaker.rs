//! Circuit breaker (part of C4, the Resilience Kit): closed / open /
//! half-open state machine guarding a single protected call site.
//!
//! A state enum plus a stats struct updated under a single async lock:
//! no DAG restructuring or meta-planner escalation, just closed / open /
//! half-open with a fallback substitution on rejection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit is open (stats: {stats:?})")]
    CircuitOpen { stats: CircuitStats },

    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub total_calls: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    pub consecutive_successes: u32,
}

impl Default for CircuitStats {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            total_calls: 0,
            last_failure: None,
            last_success: None,
            opened_at: None,
            consecutive_successes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_ms: u64,
    pub reset_timeout_ms: u64,
    pub half_open_max_calls: u32,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window_ms: 60_000,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 1,
            success_threshold: 2,
        }
    }
}

struct Inner {
    stats: CircuitStats,
    window_failures: Vec<DateTime<Utc>>,
    half_open_calls: u32,
}

/// Wraps one protected call site. Cloning shares the underlying state, so
/// every clone observes the same circuit.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                stats: CircuitStats::default(),
                window_failures: Vec::new(),
                half_open_calls: 0,
            })),
            config,
        }
    }

    pub async fn stats(&self) -> CircuitStats {
        self.inner.lock().await.stats.clone()
    }

    /// Executes `f`, routing the outcome through the state machine. If the
    /// circuit is open and `fallback` is `Some`, its value substitutes for
    /// the call's result instead of propagating `CircuitOpen`.
    pub async fn call<F, Fut, T, E>(
        &self,
        f: F,
        fallback: Option<T>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let now = Utc::now();
        {
            let mut inner = self.inner.lock().await;
            self.transition_if_due(&mut inner, now);

            if inner.stats.state == CircuitState::Open {
                let stats = inner.stats.clone();
                drop(inner);
                return match fallback {
                    Some(value) => Ok(value),
                    None => Err(CircuitBreakerError::CircuitOpen { stats }),
                };
            }

            if inner.stats.state == CircuitState::HalfOpen && inner.half_open_calls >= self.config.half_open_max_calls {
                let stats = inner.stats.clone();
                drop(inner);
                return match fallback {
                    Some(value) => Ok(value),
                    None => Err(CircuitBreakerError::CircuitOpen { stats }),
                };
            }

            if inner.stats.state == CircuitState::HalfOpen {
                inner.half_open_calls += 1;
            }
            inner.stats.total_calls += 1;
        }

        match f().await {
            Ok(value) => {
                self.record_success(Utc::now()).await;
                Ok(value)
            }
            Err(error) => {
                self.record_failure(Utc::now()).await;
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    fn transition_if_due(&self, inner: &mut Inner, now: DateTime<Utc>) {
        if inner.stats.state == CircuitState::Open {
            if let Some(opened_at) = inner.stats.opened_at {
                let elapsed_ms = (now - opened_at).num_milliseconds().max(0) as u64;
                if elapsed_ms >= self.config.reset_timeout_ms {
                    inner.stats.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 0;
                }
            }
        }

        let window = self.config.failure_window_ms;
        inner
            .window_failures
            .retain(|t| (now - *t).num_milliseconds().max(0) as u64 <= window);
    }

    async fn record_success(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        inner.stats.successes += 1;
        inner.stats.last_success = Some(now);

        match inner.stats.state {
            CircuitState::HalfOpen => {
                inner.stats.consecutive_successes += 1;
                if inner.stats.consecutive_successes >= self.config.success_threshold {
                    inner.stats.state = CircuitState::Closed;
                    inner.stats.opened_at = None;
                    inner.stats.consecutive_successes = 0;
                    inner.window_failures.clear();
                    inner.half_open_calls = 0;
                }
            }
            CircuitState::Closed => {
                inner.stats.consecutive_successes += 1;
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        inner.stats.failures += 1;
        inner.stats.last_failure = Some(now);
        inner.stats.consecutive_successes = 0;

        match inner.stats.state {
            CircuitState::HalfOpen => {
                inner.stats.state = CircuitState::Open;
                inner.stats.opened_at = Some(now);
                inner.half_open_calls = 0;
            }
            CircuitState::Closed => {
                inner.window_failures.push(now);
                let window = self.config.failure_window_ms;
                inner
                    .window_failures
                    .retain(|t| (now - *t).num_milliseconds().max(0) as u64 <= window);
                if inner.window_failures.len() as u32 >= self.config.failure_threshold {
                    inner.stats.state = CircuitState::Open;
                    inner.stats.opened_at = Some(now);
                }
            }
            CircuitState::Open => {}
        }
    }
}
