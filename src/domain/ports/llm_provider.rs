//! LLM provider capability: the only thing the Task Planner and the
//! optional aggregator synthesizer need from a language model.

use async_trait::async_trait;

/// A single-shot text completion capability. Implementations own their own
/// retry/timeout/credential handling; the core treats them as opaque.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}
