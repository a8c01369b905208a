//! Benchmarks `PriorityQueue::enqueue`/`dequeue` end to end (lock
//! acquisition plus the full rescan-and-score pass in `best_candidate`),
//! at a queue depth large enough for the rescan cost to show up.

use std::hint::black_box;

use criterion::async_executor::FuturesExecutor;
use criterion::{criterion_group, criterion_main, Criterion};

use swarmcore::domain::models::queue::Priority;
use swarmcore::domain::models::WorkerTask;
use swarmcore::infrastructure::config::QueueSettings;
use swarmcore::services::priority_queue::PriorityQueue;

const QUEUE_DEPTH: usize = 256;

async fn build_queue() -> PriorityQueue {
    let queue = PriorityQueue::new(QueueSettings::default());
    let priorities = [Priority::Critical, Priority::High, Priority::Normal, Priority::Low, Priority::Background];
    for i in 0..QUEUE_DEPTH {
        queue.enqueue(WorkerTask::new(format!("task {i}")), priorities[i % priorities.len()], None, None).await;
    }
    queue
}

fn bench_enqueue(c: &mut Criterion) {
    c.bench_function("priority_queue/enqueue_into_full_queue", |b| {
        b.to_async(FuturesExecutor).iter_batched(
            || futures::executor::block_on(build_queue()),
            |queue| async move {
                black_box(queue.enqueue(WorkerTask::new("new task"), Priority::Normal, None, None).await);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_dequeue(c: &mut Criterion) {
    c.bench_function("priority_queue/dequeue_from_full_queue", |b| {
        b.to_async(FuturesExecutor).iter_batched(
            || futures::executor::block_on(build_queue()),
            |queue| async move {
                black_box(queue.dequeue().await);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_enqueue, bench_dequeue);
criterion_main!(benches);
