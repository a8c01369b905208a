//! Benchmarks the dequeue-time scoring formula in isolation, since
//! `PriorityQueue::dequeue`/`peek` rescan and rescore every task on every
//! call rather than caching — this is the function that cost scales with.

use std::hint::black_box;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};

use swarmcore::domain::models::queue::{Priority, ScheduledTask};
use swarmcore::domain::models::WorkerTask;
use swarmcore::infrastructure::config::QueueSettings;
use swarmcore::services::priority_queue::PriorityScorer;

fn scheduled_task(priority: Priority, with_deadline: bool) -> ScheduledTask {
    ScheduledTask {
        task: WorkerTask::new("benchmark task"),
        priority,
        deadline: if with_deadline { Some(Utc::now() + chrono::Duration::seconds(30)) } else { None },
        estimated_duration_ms: Some(5_000),
        added_at: Utc::now() - chrono::Duration::minutes(3),
        scheduled_at: None,
        assigned_worker_id: None,
        dependencies_resolved: true,
        preempt_count: 1,
        original_position: 0,
    }
}

fn bench_score(c: &mut Criterion) {
    let scorer = PriorityScorer::new(QueueSettings::default());
    let now = Utc::now();

    let plain = scheduled_task(Priority::Normal, false);
    c.bench_function("priority_score/no_deadline", |b| {
        b.iter(|| scorer.score(black_box(&plain), black_box(now)));
    });

    let near_deadline = scheduled_task(Priority::High, true);
    c.bench_function("priority_score/near_deadline", |b| {
        b.iter(|| scorer.score(black_box(&near_deadline), black_box(now)));
    });
}

criterion_group!(benches, bench_score);
criterion_main!(benches);
