//! Tracer / Metrics / Health (C11): span tree per swarm with sampling, a
//! rolling metrics ring buffer, and pluggable health checks, combined
//! behind one handle so the Service facade has a single dependency to
//! thread through rather than three.

pub mod health;
pub mod metrics;
pub mod span_tree;

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::span::{Span, SpanKind, SpanLink, SpanStatus};

pub use health::{CheckResult, HealthCheck, HealthRegistry, HealthReport, HealthStatus};
pub use metrics::{MetricsRegistry, MetricsSample, MetricsWindow, DEFAULT_RING_BUFFER_SIZE};
pub use span_tree::SpanTree;

pub struct Tracer {
    spans: SpanTree,
    metrics: MetricsRegistry,
    health: HealthRegistry,
}

impl Tracer {
    #[must_use]
    pub fn new(sampling_rate: f64, health: HealthRegistry) -> Self {
        Self {
            spans: SpanTree::new(sampling_rate),
            metrics: MetricsRegistry::new(DEFAULT_RING_BUFFER_SIZE),
            health,
        }
    }

    pub async fn start_trace(&self, name: impl Into<String>, attributes: HashMap<String, Value>) -> Option<Span> {
        self.spans.start_trace(name, attributes).await
    }

    pub async fn start_span(&self, parent: &Span, name: impl Into<String>, kind: SpanKind, links: Vec<SpanLink>) -> Span {
        self.spans.start_span(parent, name, kind, links).await
    }

    pub async fn end_span(&self, span: Span, status: SpanStatus) -> Span {
        self.spans.end_span(span, status).await
    }

    pub async fn record_exception(&self, span: Span, error: &str) -> Span {
        self.spans.record_exception(span, error).await
    }

    pub async fn trace(&self, trace_id: Uuid) -> Vec<Span> {
        self.spans.trace(trace_id).await
    }

    pub async fn record_metrics(&self, swarm_id: Uuid, sample: MetricsSample) {
        self.metrics.record(swarm_id, sample).await;
    }

    pub async fn metrics_window(&self, swarm_id: Uuid) -> MetricsWindow {
        self.metrics.window(swarm_id).await
    }

    pub async fn metrics_samples(&self, swarm_id: Uuid) -> Vec<MetricsSample> {
        self.metrics.samples(swarm_id).await
    }

    pub async fn clear_metrics(&self, swarm_id: Uuid) {
        self.metrics.clear(swarm_id).await;
    }

    pub async fn health(&self) -> HealthReport {
        self.health.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracer_combines_spans_metrics_and_health() {
        let tracer = Tracer::new(1.0, HealthRegistry::new());
        let root = tracer.start_trace("swarm.execute", HashMap::new()).await.unwrap();
        tracer.end_span(root.clone(), SpanStatus::Ok).await;
        assert_eq!(tracer.trace(root.trace_id).await.len(), 1);

        let report = tracer.health().await;
        assert_eq!(report.status, HealthStatus::Healthy);
    }
}
