//! Priority Queue (C2): priority + aging + deadline + dependency-aware
//! task ordering, with preemption and a fairness tie-break.
//!
//! Scores are recomputed at evaluation time rather than cached at enqueue
//! time, so dequeues reflect the score at dequeue time rather than at
//! enqueue time — `dequeue`/`peek` always rescan.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::queue::{Priority, ScheduledTask};
use crate::domain::models::WorkerTask;
use crate::infrastructure::config::QueueSettings;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task {0} not found in queue")]
    NotFound(Uuid),

    #[error("upgrade_priority only moves a task up: {from:?} does not outrank {to:?}")]
    NotAnUpgrade { from: Priority, to: Priority },
}

/// Computes the dequeue-time score for a [`ScheduledTask`]. Held as its
/// own struct (rather than free functions) so the
/// aging factor and preempt bonus are configurable per deployment instead
/// of baked in as literals.
#[derive(Debug, Clone, Copy)]
pub struct PriorityScorer {
    aging_factor_per_minute: f64,
    preempt_bonus: f64,
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self {
            aging_factor_per_minute: 5.0,
            preempt_bonus: 50.0,
        }
    }
}

impl PriorityScorer {
    #[must_use]
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            aging_factor_per_minute: settings.aging_factor_per_minute,
            preempt_bonus: settings.preempt_bonus,
        }
    }

    /// `score = weight + age*factor + preemptCount*50 - 1000 (unresolved)
    /// - 5000 (scheduled)`, then the deadline adjustment is folded in: past
    /// deadline adds a flat +10000; otherwise the whole score is
    /// multiplied by 4 inside 60s of the deadline, by 2 inside 300s, and
    /// left alone beyond that (or with no deadline at all).
    #[must_use]
    pub fn score(&self, task: &ScheduledTask, now: DateTime<Utc>) -> f64 {
        let age_minutes = (now - task.added_at).num_milliseconds() as f64 / 60_000.0;
        let mut base = task.priority.base_weight()
            + age_minutes.max(0.0) * self.aging_factor_per_minute
            + f64::from(task.preempt_count) * self.preempt_bonus;

        if !task.dependencies_resolved {
            base -= 1000.0;
        }
        if task.scheduled_at.is_some() {
            base -= 5000.0;
        }

        match task.deadline {
            Some(deadline) if deadline <= now => base + 10_000.0,
            Some(deadline) => {
                let seconds_left = (deadline - now).num_seconds();
                if seconds_left < 60 {
                    base * 4.0
                } else if seconds_left < 300 {
                    base * 2.0
                } else {
                    base
                }
            }
            None => base,
        }
    }
}

struct QueueState {
    tasks: HashMap<Uuid, ScheduledTask>,
    failed: HashSet<Uuid>,
}

/// Priority-aware task queue. Shared across the Coordinator and any
/// caller wiring dependency-ordered scheduling ahead of spawning (see the
/// `allowDependencies` open question in DESIGN.md).
pub struct PriorityQueue {
    state: RwLock<QueueState>,
    scorer: PriorityScorer,
    next_position: AtomicU64,
}

impl PriorityQueue {
    #[must_use]
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            state: RwLock::new(QueueState {
                tasks: HashMap::new(),
                failed: HashSet::new(),
            }),
            scorer: PriorityScorer::new(settings),
            next_position: AtomicU64::new(0),
        }
    }

    fn resolved_against(task: &WorkerTask, tasks: &HashMap<Uuid, ScheduledTask>, failed: &HashSet<Uuid>) -> bool {
        task.dependencies
            .iter()
            .all(|dep| !tasks.contains_key(dep) && !failed.contains(dep))
    }

    pub async fn enqueue(
        &self,
        task: WorkerTask,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
        estimated_duration_ms: Option<u64>,
    ) -> ScheduledTask {
        let mut state = self.state.write().await;
        let dependencies_resolved = Self::resolved_against(&task, &state.tasks, &state.failed);
        let scheduled = ScheduledTask {
            task,
            priority,
            deadline,
            estimated_duration_ms,
            added_at: Utc::now(),
            scheduled_at: None,
            assigned_worker_id: None,
            dependencies_resolved,
            preempt_count: 0,
            original_position: self.next_position.fetch_add(1, Ordering::SeqCst),
        };
        state.tasks.insert(scheduled.id(), scheduled.clone());
        scheduled
    }

    /// Inserts every task, then resolves dependencies once across the
    /// whole batch — so tasks depending on earlier siblings in the same
    /// batch see them as already enqueued (hence unresolved), not missing.
    pub async fn enqueue_batch(&self, tasks: Vec<WorkerTask>, priority: Priority) -> Vec<ScheduledTask> {
        let mut state = self.state.write().await;
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let scheduled = ScheduledTask {
                task,
                priority,
                deadline: None,
                estimated_duration_ms: None,
                added_at: Utc::now(),
                scheduled_at: None,
                assigned_worker_id: None,
                dependencies_resolved: false,
                preempt_count: 0,
                original_position: self.next_position.fetch_add(1, Ordering::SeqCst),
            };
            ids.push(scheduled.id());
            state.tasks.insert(scheduled.id(), scheduled);
        }
        Self::recompute_resolution(&mut state);
        ids.into_iter().map(|id| state.tasks[&id].clone()).collect()
    }

    fn recompute_resolution(state: &mut QueueState) {
        let pending: HashSet<Uuid> = state.tasks.keys().copied().collect();
        for task in state.tasks.values_mut() {
            if task.dependencies_resolved {
                continue;
            }
            task.dependencies_resolved = task
                .task
                .dependencies
                .iter()
                .all(|dep| !pending.contains(dep) && !state.failed.contains(dep));
        }
    }

    /// Highest-score dequeuable task, removed from the queue and marked
    /// `scheduled_at = now`.
    pub async fn dequeue(&self) -> Option<ScheduledTask> {
        let mut state = self.state.write().await;
        let id = self.best_candidate(&state)?;
        let task = state.tasks.get_mut(&id)?;
        task.scheduled_at = Some(Utc::now());
        Some(task.clone())
    }

    pub async fn dequeue_n(&self, n: usize) -> Vec<ScheduledTask> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.dequeue().await {
                Some(task) => out.push(task),
                None => break,
            }
        }
        out
    }

    /// Highest-score dequeuable task without claiming it. Callers must not
    /// cache this across subsequent mutations — the score can
    /// change (aging, a competing preempt) before the next `dequeue`.
    pub async fn peek(&self) -> Option<ScheduledTask> {
        let state = self.state.read().await;
        let id = self.best_candidate(&state)?;
        state.tasks.get(&id).cloned()
    }

    fn best_candidate(&self, state: &QueueState) -> Option<Uuid> {
        let now = Utc::now();
        state
            .tasks
            .values()
            .filter(|t| t.is_dequeuable())
            .map(|t| (t.id(), self.scorer.score(t, now), t.original_position))
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.2.cmp(&a.2))
            })
            .map(|(id, _, _)| id)
    }

    /// Removes `id` and resolves dependents whose full dependency set is
    /// no longer present in the queue.
    pub async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        state.tasks.remove(&id).ok_or(QueueError::NotFound(id))?;
        Self::recompute_resolution(&mut state);
        Ok(())
    }

    /// Removes `id` and marks direct dependents as unresolved — a failed
    /// dependency permanently blocks its dependents rather than letting
    /// them become dequeuable once it's merely absent from the queue.
    pub async fn fail(&self, id: Uuid, _error: impl Into<String>) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        state.tasks.remove(&id).ok_or(QueueError::NotFound(id))?;
        state.failed.insert(id);
        for task in state.tasks.values_mut() {
            if task.task.dependencies.contains(&id) {
                task.dependencies_resolved = false;
            }
        }
        Ok(())
    }

    /// Clears `scheduled_at`, increments `preempt_count`, and bumps
    /// priority one step (unless already critical) for fairness.
    pub async fn preempt(&self, id: Uuid) -> Result<ScheduledTask, QueueError> {
        let mut state = self.state.write().await;
        let task = state.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        task.scheduled_at = None;
        task.preempt_count += 1;
        task.priority = task.priority.step_up();
        Ok(task.clone())
    }

    /// Only ever moves a task up the priority bands.
    pub async fn upgrade_priority(&self, id: Uuid, new_priority: Priority) -> Result<ScheduledTask, QueueError> {
        let mut state = self.state.write().await;
        let task = state.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if !new_priority.outranks(task.priority) {
            return Err(QueueError::NotAnUpgrade {
                from: task.priority,
                to: new_priority,
            });
        }
        task.priority = new_priority;
        Ok(task.clone())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub type SharedPriorityQueue = Arc<PriorityQueue>;

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> WorkerTask {
        WorkerTask::new("do the thing")
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let low = queue.enqueue(task(), Priority::Low, None, None).await;
        let critical = queue.enqueue(task(), Priority::Critical, None, None).await;

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.id(), critical.id());
        let _ = low;
    }

    #[tokio::test]
    async fn equal_priority_breaks_tie_by_insertion_order() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let first_in = queue.enqueue(task(), Priority::Normal, None, None).await;
        let second_in = queue.enqueue(task(), Priority::Normal, None, None).await;

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id(), first_in.id());
        let _ = second_in;
    }

    #[tokio::test]
    async fn past_deadline_boosts_score_additively() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let normal = queue.enqueue(task(), Priority::Normal, None, None).await;
        let overdue = queue
            .enqueue(task(), Priority::Low, Some(Utc::now() - chrono::Duration::seconds(5)), None)
            .await;

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id(), overdue.id());
        let _ = normal;
    }

    #[tokio::test]
    async fn unresolved_dependency_is_not_dequeuable() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let dep = task();
        let dep_id = dep.id;
        let dependent = WorkerTask::new("after").with_dependencies(vec![dep_id]);

        queue.enqueue(dep, Priority::Normal, None, None).await;
        queue.enqueue(dependent, Priority::Critical, None, None).await;

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id(), dep_id, "dependency must go first despite lower priority");
    }

    #[tokio::test]
    async fn completing_a_dependency_unblocks_dependent() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let dep = task();
        let dep_id = dep.id;
        let dependent = WorkerTask::new("after").with_dependencies(vec![dep_id]);
        let dependent_id = dependent.id;

        queue.enqueue(dep, Priority::Normal, None, None).await;
        queue.enqueue(dependent, Priority::Normal, None, None).await;

        queue.dequeue().await.unwrap();
        queue.complete(dep_id).await.unwrap();

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id(), dependent_id);
    }

    #[tokio::test]
    async fn failing_a_dependency_keeps_dependent_blocked() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let dep = task();
        let dep_id = dep.id;
        let dependent = WorkerTask::new("after").with_dependencies(vec![dep_id]);

        queue.enqueue(dep, Priority::Normal, None, None).await;
        queue.enqueue(dependent, Priority::Normal, None, None).await;

        queue.dequeue().await.unwrap();
        queue.fail(dep_id, "boom").await.unwrap();

        assert!(queue.dequeue().await.is_none(), "dependent permanently blocked by failed dependency");
    }

    #[tokio::test]
    async fn preempt_clears_schedule_and_bumps_priority() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let scheduled = queue.enqueue(task(), Priority::Low, None, None).await;
        queue.dequeue().await.unwrap();

        let preempted = queue.preempt(scheduled.id()).await.unwrap();
        assert_eq!(preempted.priority, Priority::Normal);
        assert_eq!(preempted.preempt_count, 1);
        assert!(preempted.scheduled_at.is_none());
    }

    #[tokio::test]
    async fn upgrade_priority_rejects_downgrade() {
        let queue = PriorityQueue::new(QueueSettings::default());
        let scheduled = queue.enqueue(task(), Priority::High, None, None).await;
        let result = queue.upgrade_priority(scheduled.id(), Priority::Low).await;
        assert!(matches!(result, Err(QueueError::NotAnUpgrade { .. })));
    }
}
