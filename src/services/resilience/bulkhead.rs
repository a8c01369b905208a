//! Bulkhead (part of C4): caps concurrent executions and bounds the queue
//! of acquirers waiting for a slot.
//!
//! Built on `tokio::sync::Semaphore` rather than a hand-rolled counter —
//! the semaphore already gives FIFO wake order and a cancel-safe `acquire`,
//! which is exactly the queue discipline a bounded admission gate needs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum BulkheadError {
    #[error("bulkhead queue is full ({waiting} already waiting, limit {max_queue})")]
    BulkheadFull { waiting: usize, max_queue: usize },

    #[error("timed out after {0:?} waiting for a bulkhead slot")]
    BulkheadTimeout(Duration),
}

/// Holds a bulkhead slot; dropping it releases the slot and admits the
/// next waiter.
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Clone)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_queue: usize,
    queue_timeout: Duration,
}

impl Bulkhead {
    #[must_use]
    pub fn new(max_concurrent: usize, max_queue: usize, queue_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_queue,
            queue_timeout,
        }
    }

    /// Grants a slot immediately if one is free; otherwise queues (FIFO)
    /// up to `max_queue` deep, waiting up to `queue_timeout`.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(BulkheadPermit { _permit: permit });
        }

        let waiting = self.waiting.fetch_add(1, Ordering::SeqCst);
        if waiting >= self.max_queue {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(BulkheadError::BulkheadFull {
                waiting,
                max_queue: self.max_queue,
            });
        }

        let result = tokio::time::timeout(self.queue_timeout, Arc::clone(&self.semaphore).acquire_owned()).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
            Ok(Err(_closed)) => Err(BulkheadError::BulkheadTimeout(self.queue_timeout)),
            Err(_elapsed) => Err(BulkheadError::BulkheadTimeout(self.queue_timeout)),
        }
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_slot_when_below_capacity() {
        let bulkhead = Bulkhead::new(2, 5, Duration::from_millis(100));
        let permit = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.available_permits(), 1);
        drop(permit);
    }

    #[tokio::test]
    async fn release_admits_next_waiter() {
        let bulkhead = Bulkhead::new(1, 5, Duration::from_millis(200));
        let first = bulkhead.acquire().await.unwrap();

        let bulkhead_clone = bulkhead.clone();
        let waiter = tokio::spawn(async move { bulkhead_clone.acquire().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(first);

        let second = waiter.await.unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn queue_full_rejects_immediately() {
        let bulkhead = Bulkhead::new(1, 0, Duration::from_millis(100));
        let _permit = bulkhead.acquire().await.unwrap();

        let result = bulkhead.acquire().await;
        assert!(matches!(result, Err(BulkheadError::BulkheadFull { .. })));
    }

    #[tokio::test]
    async fn times_out_when_queue_never_drains() {
        let bulkhead = Bulkhead::new(1, 2, Duration::from_millis(30));
        let _permit = bulkhead.acquire().await.unwrap();

        let result = bulkhead.acquire().await;
        assert!(matches!(result, Err(BulkheadError::BulkheadTimeout(_))));
    }
}
