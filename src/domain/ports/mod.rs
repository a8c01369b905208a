//! Domain ports (capability interfaces) for the swarm orchestration core.
//!
//! Each port is a narrow capability trait rather than a class hierarchy:
//! composition over inheritance, `#[async_trait]` + `Send + Sync` so
//! implementations can be shared across the worker coroutines that use
//! them concurrently.

pub mod actuator;
pub mod llm_provider;
pub mod synthesizer;

pub use actuator::{Actuator, OpenWindowRequest, OpenWindowResponse};
pub use llm_provider::LlmProvider;
pub use synthesizer::Synthesizer;
