//! Per-swarm metrics ring buffer (default 1000 entries) and window
//! aggregation (means and peaks).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::swarm::SwarmState;

pub const DEFAULT_RING_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSample {
    pub swarm_state: SwarmState,
    pub worker_count: u32,
    pub active_workers: u32,
    pub completed_workers: u32,
    pub failed_workers: u32,
    pub task_queue_size: u32,
    pub avg_worker_latency_ms: f64,
    pub avg_task_duration_ms: f64,
    pub memory_usage_mb: f64,
    pub cpu_utilization: f64,
    pub throughput_tasks_per_min: f64,
    pub error_rate: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsWindow {
    pub sample_count: usize,
    pub mean_avg_worker_latency_ms: f64,
    pub mean_avg_task_duration_ms: f64,
    pub mean_cpu_utilization: f64,
    pub mean_throughput_tasks_per_min: f64,
    pub mean_error_rate: f64,
    pub peak_memory_usage_mb: f64,
    pub peak_cpu_utilization: f64,
    pub peak_active_workers: u32,
}

pub struct MetricsRegistry {
    buffers: RwLock<HashMap<Uuid, VecDeque<MetricsSample>>>,
    capacity: usize,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Pushes a sample, evicting the oldest once the ring buffer is full.
    pub async fn record(&self, swarm_id: Uuid, sample: MetricsSample) {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(swarm_id).or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(sample);
    }

    pub async fn samples(&self, swarm_id: Uuid) -> Vec<MetricsSample> {
        self.buffers.read().await.get(&swarm_id).map(|b| b.iter().cloned().collect()).unwrap_or_default()
    }

    /// Means and peaks over every sample currently buffered for
    /// `swarm_id` (the "window" is the ring buffer itself; callers that
    /// want a shorter window should filter `samples()` by timestamp).
    pub async fn window(&self, swarm_id: Uuid) -> MetricsWindow {
        let buffers = self.buffers.read().await;
        let Some(buffer) = buffers.get(&swarm_id) else {
            return MetricsWindow::default();
        };
        if buffer.is_empty() {
            return MetricsWindow::default();
        }

        let n = buffer.len() as f64;
        let mut window = MetricsWindow {
            sample_count: buffer.len(),
            ..MetricsWindow::default()
        };

        for sample in buffer {
            window.mean_avg_worker_latency_ms += sample.avg_worker_latency_ms / n;
            window.mean_avg_task_duration_ms += sample.avg_task_duration_ms / n;
            window.mean_cpu_utilization += sample.cpu_utilization / n;
            window.mean_throughput_tasks_per_min += sample.throughput_tasks_per_min / n;
            window.mean_error_rate += sample.error_rate / n;
            window.peak_memory_usage_mb = window.peak_memory_usage_mb.max(sample.memory_usage_mb);
            window.peak_cpu_utilization = window.peak_cpu_utilization.max(sample.cpu_utilization);
            window.peak_active_workers = window.peak_active_workers.max(sample.active_workers);
        }
        window
    }

    pub async fn clear(&self, swarm_id: Uuid) {
        self.buffers.write().await.remove(&swarm_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f64, memory: f64) -> MetricsSample {
        MetricsSample {
            swarm_state: SwarmState::Executing,
            worker_count: 3,
            active_workers: 2,
            completed_workers: 1,
            failed_workers: 0,
            task_queue_size: 0,
            avg_worker_latency_ms: 100.0,
            avg_task_duration_ms: 200.0,
            memory_usage_mb: memory,
            cpu_utilization: cpu,
            throughput_tasks_per_min: 5.0,
            error_rate: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_past_capacity() {
        let registry = MetricsRegistry::new(2);
        let swarm_id = Uuid::new_v4();
        registry.record(swarm_id, sample(10.0, 100.0)).await;
        registry.record(swarm_id, sample(20.0, 100.0)).await;
        registry.record(swarm_id, sample(30.0, 100.0)).await;

        let samples = registry.samples(swarm_id).await;
        assert_eq!(samples.len(), 2);
        assert!((samples[0].cpu_utilization - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn window_computes_means_and_peaks() {
        let registry = MetricsRegistry::new(10);
        let swarm_id = Uuid::new_v4();
        registry.record(swarm_id, sample(10.0, 50.0)).await;
        registry.record(swarm_id, sample(30.0, 150.0)).await;

        let window = registry.window(swarm_id).await;
        assert!((window.mean_cpu_utilization - 20.0).abs() < 1e-9);
        assert!((window.peak_cpu_utilization - 30.0).abs() < f64::EPSILON);
        assert!((window.peak_memory_usage_mb - 150.0).abs() < f64::EPSILON);
    }
}
