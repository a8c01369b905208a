//! Worker Pool (C5): pre-warmed worker sessions with acquire/release,
//! idle reaping, auto-scale, and a cooperative drain/shutdown path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::models::pool::{PooledWorker, PooledWorkerState};
use crate::domain::ports::actuator::{Actuator, OpenWindowRequest};
use crate::infrastructure::config::PoolSettings;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn a pooled worker session: {0}")]
    SpawnFailed(#[source] anyhow::Error),

    #[error("timed out after {0:?} waiting for a pool slot")]
    Timeout(Duration),

    #[error("pooled worker {0} not found")]
    NotFound(Uuid),

    #[error("pool is draining, new acquisitions are rejected")]
    Draining,
}

struct PoolState {
    workers: HashMap<Uuid, PooledWorker>,
    last_scale_time: DateTime<Utc>,
}

/// Holds every `PooledWorker` entry. Shared as an `Arc` so the background
/// maintenance task and callers of `acquire`/`release` see the same pool.
pub struct WorkerPool {
    actuator: Arc<dyn Actuator>,
    state: RwLock<PoolState>,
    settings: PoolSettings,
    release_notify: Notify,
    draining: AtomicBool,
    maintenance_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(actuator: Arc<dyn Actuator>, settings: PoolSettings) -> Arc<Self> {
        Arc::new(Self {
            actuator,
            state: RwLock::new(PoolState {
                workers: HashMap::new(),
                last_scale_time: Utc::now(),
            }),
            settings,
            release_notify: Notify::new(),
            draining: AtomicBool::new(false),
            maintenance_handle: Mutex::new(None),
        })
    }

    /// Starts the background maintenance loop and kicks off a best-effort
    /// warm-up of `minWorkers`, deferred so it never blocks startup.
    pub async fn initialize(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(pool.settings.maintenance_interval_ms));
            loop {
                interval.tick().await;
                pool.run_maintenance().await;
            }
        });
        *self.maintenance_handle.lock().await = Some(handle);

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            for _ in 0..pool.settings.min_workers {
                if let Err(error) = pool.spawn_warm_worker().await {
                    tracing::warn!(%error, "deferred warm-up failed to spawn a worker");
                }
            }
        });
    }

    async fn spawn_warm_worker(&self) -> Result<Uuid, PoolError> {
        let started = Utc::now();
        let response = self
            .actuator
            .open_window(OpenWindowRequest {
                url: None,
                focused: false,
                width: None,
                height: None,
            })
            .await
            .map_err(PoolError::SpawnFailed)?;
        let warmup_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

        let worker = PooledWorker::new(response.window_id, warmup_ms, 0);
        let id = worker.id;
        self.state.write().await.workers.insert(id, worker);
        Ok(id)
    }

    /// Prefers an idle/warm worker; spawns a new one if under
    /// `maxWorkers`; otherwise waits for a release up to
    /// `warmupTimeoutMs`.
    pub async fn acquire(&self, task_id: Uuid) -> Result<Uuid, PoolError> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(PoolError::Draining);
        }

        if let Some(id) = self.try_claim_available(task_id).await {
            return Ok(id);
        }

        let under_capacity = { self.state.read().await.workers.len() < self.settings.max_workers as usize };
        if under_capacity {
            let id = self.spawn_warm_worker().await?;
            if let Some(claimed) = self.claim(id, task_id).await {
                return Ok(claimed);
            }
        }

        let timeout = Duration::from_millis(self.settings.warmup_timeout_ms);
        tokio::time::timeout(timeout, async {
            loop {
                self.release_notify.notified().await;
                if let Some(id) = self.try_claim_available(task_id).await {
                    return id;
                }
            }
        })
        .await
        .map_err(|_elapsed| PoolError::Timeout(timeout))
    }

    async fn try_claim_available(&self, task_id: Uuid) -> Option<Uuid> {
        let mut state = self.state.write().await;
        let candidate = state
            .workers
            .values()
            .find(|w| w.is_available())
            .map(|w| w.id)?;
        let worker = state.workers.get_mut(&candidate)?;
        worker.state = PooledWorkerState::Busy;
        worker.current_task = Some(task_id);
        worker.task_count += 1;
        worker.last_used_at = Utc::now();
        Some(candidate)
    }

    async fn claim(&self, id: Uuid, task_id: Uuid) -> Option<Uuid> {
        let mut state = self.state.write().await;
        let worker = state.workers.get_mut(&id)?;
        if !worker.is_available() {
            return None;
        }
        worker.state = PooledWorkerState::Busy;
        worker.current_task = Some(task_id);
        worker.task_count += 1;
        worker.last_used_at = Utc::now();
        Some(id)
    }

    /// Marks `id` idle, updates `lastUsedAt`, wakes one waiting `acquire`,
    /// and triggers an auto-scale check.
    pub async fn release(&self, id: Uuid) -> Result<(), PoolError> {
        {
            let mut state = self.state.write().await;
            let worker = state.workers.get_mut(&id).ok_or(PoolError::NotFound(id))?;
            worker.state = PooledWorkerState::Idle;
            worker.current_task = None;
            worker.last_used_at = Utc::now();
        }
        self.release_notify.notify_one();
        self.auto_scale().await;
        Ok(())
    }

    async fn run_maintenance(&self) {
        self.reap_idle().await;
        self.top_up_warm().await;
    }

    async fn reap_idle(&self) {
        let idle_timeout = Duration::from_millis(self.settings.idle_timeout_ms);
        let now = Utc::now();
        let mut state = self.state.write().await;
        let min_workers = self.settings.min_workers as usize;

        let stale: Vec<Uuid> = state
            .workers
            .values()
            .filter(|w| w.is_available())
            .filter(|w| (now - w.last_used_at).to_std().map(|d| d >= idle_timeout).unwrap_or(false))
            .map(|w| w.id)
            .collect();

        for id in stale {
            if state.workers.len() <= min_workers {
                break;
            }
            if let Some(worker) = state.workers.remove(&id) {
                self.close_session(&worker.session_id).await;
            }
        }
    }

    async fn top_up_warm(&self) {
        let target = (self.settings.max_workers as f64 * self.settings.warm_pool_ratio).ceil() as usize;
        let target = target.min(self.settings.max_workers as usize);

        loop {
            let current = self.state.read().await.workers.len();
            if current >= target {
                break;
            }
            if let Err(error) = self.spawn_warm_worker().await {
                tracing::warn!(%error, "maintenance top-up failed to spawn a worker");
                break;
            }
        }
    }

    async fn auto_scale(&self) {
        let cooldown = Duration::from_millis(self.settings.scale_cooldown_ms);
        let (utilization, total, idle_id) = {
            let state = self.state.read().await;
            if (Utc::now() - state.last_scale_time).to_std().map(|d| d < cooldown).unwrap_or(true) {
                return;
            }
            let total = state.workers.len();
            let busy = state.workers.values().filter(|w| w.state == PooledWorkerState::Busy).count();
            let utilization = if total == 0 { 0.0 } else { busy as f64 / total as f64 };
            let idle_id = state.workers.values().find(|w| w.is_available()).map(|w| w.id);
            (utilization, total, idle_id)
        };

        if utilization > self.settings.scale_up_threshold && total < self.settings.max_workers as usize {
            if self.spawn_warm_worker().await.is_ok() {
                self.state.write().await.last_scale_time = Utc::now();
            }
        } else if utilization < self.settings.scale_down_threshold && total > self.settings.min_workers as usize {
            if let Some(id) = idle_id {
                let mut state = self.state.write().await;
                if let Some(worker) = state.workers.remove(&id) {
                    drop(state);
                    self.close_session(&worker.session_id).await;
                    self.state.write().await.last_scale_time = Utc::now();
                }
            }
        }
    }

    async fn close_session(&self, session_id: &str) {
        if let Err(error) = self.actuator.close_window(session_id).await {
            tracing::warn!(session_id, %error, "failed to close pooled worker session");
        }
    }

    /// Stops accepting new tasks, marks every idle/warm entry draining,
    /// waits for busy workers to finish, then shuts down.
    pub async fn drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
        {
            let mut state = self.state.write().await;
            for worker in state.workers.values_mut() {
                if worker.is_available() {
                    worker.state = PooledWorkerState::Draining;
                }
            }
        }

        loop {
            let still_busy = self
                .state
                .read()
                .await
                .workers
                .values()
                .any(|w| w.state == PooledWorkerState::Busy);
            if !still_busy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.shutdown().await;
    }

    /// Cancels maintenance, terminates every entry, and clears the pool.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.maintenance_handle.lock().await.take() {
            handle.abort();
        }

        let sessions: Vec<String> = {
            let mut state = self.state.write().await;
            let sessions = state.workers.values().map(|w| w.session_id.clone()).collect();
            state.workers.clear();
            sessions
        };
        for session_id in sessions {
            self.close_session(&session_id).await;
        }
        tracing::info!("worker pool shut down");
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn utilization(&self) -> f64 {
        let state = self.state.read().await;
        let total = state.workers.len();
        if total == 0 {
            return 0.0;
        }
        let busy = state.workers.values().filter(|w| w.state == PooledWorkerState::Busy).count();
        busy as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::actuator::OpenWindowResponse;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct MockActuator {
        counter: AtomicU32,
    }

    #[async_trait]
    impl Actuator for MockActuator {
        async fn open_window(&self, _request: OpenWindowRequest) -> anyhow::Result<OpenWindowResponse> {
            let id = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(OpenWindowResponse {
                window_id: format!("session-{id}"),
            })
        }

        async fn close_window(&self, _window_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn settings() -> PoolSettings {
        PoolSettings {
            min_workers: 0,
            max_workers: 2,
            warm_pool_ratio: 0.5,
            idle_timeout_ms: 120_000,
            warmup_timeout_ms: 200,
            maintenance_interval_ms: 30_000,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.2,
            scale_cooldown_ms: 0,
        }
    }

    #[tokio::test]
    async fn acquire_spawns_new_worker_under_capacity() {
        let actuator = Arc::new(MockActuator { counter: AtomicU32::new(0) });
        let pool = WorkerPool::new(actuator, settings());

        let id = pool.acquire(Uuid::new_v4()).await.unwrap();
        assert_eq!(pool.len().await, 1);
        let _ = id;
    }

    #[tokio::test]
    async fn release_makes_worker_available_again() {
        let actuator = Arc::new(MockActuator { counter: AtomicU32::new(0) });
        let pool = WorkerPool::new(actuator, settings());

        let worker_id = pool.acquire(Uuid::new_v4()).await.unwrap();
        pool.release(worker_id).await.unwrap();

        let second = pool.acquire(Uuid::new_v4()).await.unwrap();
        assert_eq!(second, worker_id, "reuses the released worker instead of spawning a new one");
    }

    #[tokio::test]
    async fn acquire_times_out_at_full_capacity() {
        let actuator = Arc::new(MockActuator { counter: AtomicU32::new(0) });
        let pool = WorkerPool::new(actuator, settings());

        let _a = pool.acquire(Uuid::new_v4()).await.unwrap();
        let _b = pool.acquire(Uuid::new_v4()).await.unwrap();

        let result = pool.acquire(Uuid::new_v4()).await;
        assert!(matches!(result, Err(PoolError::Timeout(_))));
    }

    #[tokio::test]
    async fn drain_waits_for_busy_workers_then_shuts_down() {
        let actuator = Arc::new(MockActuator { counter: AtomicU32::new(0) });
        let pool = WorkerPool::new(actuator, settings());
        let worker_id = pool.acquire(Uuid::new_v4()).await.unwrap();

        let pool_clone = Arc::clone(&pool);
        let drain_task = tokio::spawn(async move { pool_clone.drain().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.release(worker_id).await.unwrap();
        drain_task.await.unwrap();

        assert_eq!(pool.len().await, 0);
    }
}
