//! Synthesizer capability: optional external step that turns a batch of
//! worker results into one coherent final value, used by the Result
//! Aggregator in place of its built-in simple formatter.

use async_trait::async_trait;

use crate::domain::models::WorkerResult;

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        task: &str,
        results: &[WorkerResult],
        output_format: &str,
    ) -> anyhow::Result<serde_json::Value>;
}
