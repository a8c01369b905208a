//! Trace/span allocation with sampling, built directly on the
//! `domain::models::span::Span` tree model.

use std::collections::HashMap;

use rand::Rng;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::span::{Span, SpanKind, SpanLink, SpanStatus};

pub struct SpanTree {
    /// Keyed by `trace_id`; a trace's spans are appended as they're
    /// started and mutated in place as they end.
    traces: RwLock<HashMap<Uuid, Vec<Span>>>,
    sampling_rate: f64,
}

impl SpanTree {
    #[must_use]
    pub fn new(sampling_rate: f64) -> Self {
        Self {
            traces: RwLock::new(HashMap::new()),
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
        }
    }

    fn sampled(&self) -> bool {
        if self.sampling_rate >= 1.0 {
            return true;
        }
        if self.sampling_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.sampling_rate)
    }

    /// Allocates a new trace id and root span. Returns `None` when
    /// sampling excludes this trace; callers should skip further spans
    /// for it rather than starting an unsampled tree.
    pub async fn start_trace(&self, name: impl Into<String>, attributes: HashMap<String, Value>) -> Option<Span> {
        if !self.sampled() {
            return None;
        }
        let mut span = Span::root(name, SpanKind::Internal);
        span.attributes = attributes;
        self.traces.write().await.entry(span.trace_id).or_default().push(span.clone());
        Some(span)
    }

    /// Starts a child span under `parent`, optionally cross-linked to
    /// other spans via `links`.
    pub async fn start_span(&self, parent: &Span, name: impl Into<String>, kind: SpanKind, links: Vec<SpanLink>) -> Span {
        let mut span = parent.child(name, kind);
        span.links = links;
        self.traces.write().await.entry(span.trace_id).or_default().push(span.clone());
        span
    }

    /// Ends the span (no-op if already ended) and persists the update
    /// into its trace's span list.
    pub async fn end_span(&self, mut span: Span, status: SpanStatus) -> Span {
        span.end(status);
        self.replace(&span).await;
        span
    }

    pub async fn record_exception(&self, mut span: Span, error: &str) -> Span {
        span.record_exception(error);
        self.replace(&span).await;
        span
    }

    async fn replace(&self, span: &Span) {
        let mut traces = self.traces.write().await;
        if let Some(spans) = traces.get_mut(&span.trace_id) {
            if let Some(existing) = spans.iter_mut().find(|s| s.span_id == span.span_id) {
                *existing = span.clone();
            }
        }
    }

    pub async fn trace(&self, trace_id: Uuid) -> Vec<Span> {
        self.traces.read().await.get(&trace_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_sampled_trace_allocates_root_span() {
        let tracer = SpanTree::new(1.0);
        let span = tracer.start_trace("swarm.execute", HashMap::new()).await.unwrap();
        assert!(span.parent_span_id.is_none());
        assert_eq!(span.status, SpanStatus::Unset);
    }

    #[tokio::test]
    async fn never_sampled_trace_returns_none() {
        let tracer = SpanTree::new(0.0);
        assert!(tracer.start_trace("swarm.execute", HashMap::new()).await.is_none());
    }

    #[tokio::test]
    async fn child_span_shares_trace_id_and_links_to_parent() {
        let tracer = SpanTree::new(1.0);
        let root = tracer.start_trace("swarm.execute", HashMap::new()).await.unwrap();
        let child = tracer.start_span(&root, "worker.spawn", SpanKind::Internal, vec![]).await;
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id, Some(root.span_id));
    }

    #[tokio::test]
    async fn end_span_persists_status_into_trace() {
        let tracer = SpanTree::new(1.0);
        let root = tracer.start_trace("swarm.execute", HashMap::new()).await.unwrap();
        let ended = tracer.end_span(root.clone(), SpanStatus::Ok).await;
        assert!(ended.end_time.is_some());

        let trace = tracer.trace(root.trace_id).await;
        assert_eq!(trace[0].status, SpanStatus::Ok);
    }

    #[tokio::test]
    async fn record_exception_sets_error_status_and_appends_event() {
        let tracer = SpanTree::new(1.0);
        let root = tracer.start_trace("swarm.execute", HashMap::new()).await.unwrap();
        let span = tracer.record_exception(root, "boom").await;
        assert_eq!(span.status, SpanStatus::Error);
        assert_eq!(span.events.len(), 1);
        assert_eq!(span.events[0].name, "exception");
    }
}
