//! Tracer span tree model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: Uuid,
    pub span_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub name: String,
    pub kind: SpanKind,
    pub status: SpanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Ordered; `recordException` appends an `"exception"` event here.
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default)]
    pub links: Vec<SpanLink>,
}

impl Span {
    #[must_use]
    pub fn root(name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            name: name.into(),
            kind,
            status: SpanStatus::Unset,
            start_time: Utc::now(),
            end_time: None,
            attributes: HashMap::new(),
            events: Vec::new(),
            links: Vec::new(),
        }
    }

    #[must_use]
    pub fn child(&self, name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            name: name.into(),
            kind,
            status: SpanStatus::Unset,
            start_time: Utc::now(),
            end_time: None,
            attributes: HashMap::new(),
            events: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Ends the span, setting its status. A no-op if already ended: the
    /// invariant is "ended at most once", so a second call is silently
    /// ignored rather than overwriting `end_time`.
    pub fn end(&mut self, status: SpanStatus) {
        if self.end_time.is_some() {
            return;
        }
        self.end_time = Some(Utc::now());
        self.status = status;
    }

    pub fn record_exception(&mut self, error: &str) {
        let mut attributes = HashMap::new();
        attributes.insert(
            "exception.message".to_string(),
            serde_json::Value::String(error.to_string()),
        );
        self.events.push(SpanEvent {
            name: "exception".to_string(),
            timestamp: Utc::now(),
            attributes,
        });
        self.status = SpanStatus::Error;
    }
}
