//! Retry (part of C4): jittered exponential backoff around a fallible
//! async operation, reusing `domain::models::swarm::RetryPolicy`'s backoff
//! shape so worker respawn delay and this generic helper never drift.

use std::future::Future;

use rand::Rng;

use crate::domain::models::RetryPolicy;

/// Decides whether a failed attempt should be retried at all. The default
/// always retries until `max_retries` is exhausted; callers wire in
/// error-specific logic (e.g. "don't retry on validation errors").
pub trait ShouldRetry<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> bool;
}

pub struct AlwaysRetry;

impl<E> ShouldRetry<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E, _attempt: u32) -> bool {
        true
    }
}

impl<E, F: Fn(&E, u32) -> bool> ShouldRetry<E> for F {
    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        self(error, attempt)
    }
}

/// Retries `operation` per `policy`, applying `±25%` jitter to each
/// backoff sleep, until it succeeds, `policy.max_retries` is exhausted, or
/// `should_retry` vetoes another attempt. Surfaces the last error.
pub async fn retry<F, Fut, T, E, S>(policy: &RetryPolicy, should_retry: &S, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    S: ShouldRetry<E>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_retries || !should_retry.should_retry(&error, attempt) {
                    return Err(error);
                }
                let delay_ms = jittered(policy.backoff_for_attempt(attempt));
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}

fn jittered(base_ms: u64) -> u64 {
    let jitter_fraction = rand::thread_rng().gen_range(-0.25..=0.25);
    let jittered = (base_ms as f64) * (1.0 + jitter_fraction);
    jittered.max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let policy = RetryPolicy::default();
        let result: Result<&str, &str> = retry(&policy, &AlwaysRetry, || async { Ok("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 1,
            max_delay_ms: 2,
            exponential_factor: 1.0,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = retry(&policy, &AlwaysRetry, || {
            let attempts = &attempts;
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_after_exhausting_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            exponential_factor: 1.0,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<&str, u32> = retry(&policy, &AlwaysRetry, || {
            let attempts = &attempts;
            async move { Err(attempts.fetch_add(1, Ordering::SeqCst)) }
        })
        .await;
        assert_eq!(result.unwrap_err(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_retry_veto_stops_immediately() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 1,
            max_delay_ms: 2,
            exponential_factor: 1.0,
        };
        let never_retry = |_: &&str, _: u32| false;
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = retry(&policy, &never_retry, || {
            let attempts = &attempts;
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("permanent")
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
