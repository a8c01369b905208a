//! Actuator capability: the external side-effectful work a worker session
//! actually drives (browser windows, or whatever executes the instruction).
//! The core spawns and terminates sessions through this trait without
//! owning what happens inside them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWindowRequest {
    pub url: Option<String>,
    pub focused: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWindowResponse {
    pub window_id: String,
}

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Allocates a new session backing one worker. The returned
    /// `window_id` becomes the worker's `session_id`.
    async fn open_window(&self, request: OpenWindowRequest) -> anyhow::Result<OpenWindowResponse>;

    /// Releases a session. Called on worker completion, failure, and
    /// termination alike; implementations should make this idempotent.
    async fn close_window(&self, window_id: &str) -> anyhow::Result<()>;
}
