//! Timeout (part of C4): races a future against a deadline.
//!
//! A thin wrapper over `tokio::time::timeout` — tokio already cancels the
//! losing future by dropping it, which is as close as an async runtime
//! gets to cancelling the underlying operation outright.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_elapsed| TimeoutError(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_when_work_finishes_in_time() {
        let result = with_timeout(Duration::from_millis(50), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn times_out_when_work_is_slow() {
        let result = with_timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            42
        })
        .await;
        assert!(matches!(result, Err(TimeoutError(_))));
    }
}
