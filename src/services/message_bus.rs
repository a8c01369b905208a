//! Message Bus (C1): in-process pub/sub with per-swarm channels and a
//! bounded `wait_for` helper, backed by one `tokio::broadcast` channel per
//! channel name (mirrors the broadcast-channel shape `services::event_bus`
//! uses for its unified event stream, generalized to dynamic per-swarm
//! channel names instead of one process-wide channel).
//!
//! Channel naming is deterministic: `swarm:{swarmId}:master`,
//! `swarm:{swarmId}:worker:{workerId}`, `swarm:{swarmId}:broadcast`, and
//! the `swarm:{swarmId}:all` wiretap mirror every non-broadcast send lands
//! on too. The bus holds no state beyond live subscriptions: dropping a
//! `Subscription` (or calling `remove_swarm_listeners`) is the only way a
//! channel's backlog is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::models::message::{wiretap_channel, CoordinationAction};
use crate::domain::models::{Message, MessagePayload, TargetId, TaskMetrics, WorkerTask};

/// Broadcast channel capacity. Generous enough that a slow subscriber
/// doesn't miss messages under normal swarm-sized fan-out; lagging
/// subscribers see `RecvError::Lagged` rather than blocking senders, since
/// handlers must be non-blocking per the bus's delivery contract.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no message of the requested type arrived within {0:?}")]
    Timeout(Duration),

    #[error("subscription channel closed before a matching message arrived")]
    Closed,
}

/// A live subscription to one channel. Dropping it (or letting it go out
/// of scope) is the unsubscribe: once the last receiver for a channel's
/// `broadcast::Sender` is gone, further sends on that channel are no-ops
/// until a new subscriber arrives.
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<Message>,
}

impl Subscription {
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Awaits the next message on this channel, skipping over lag gaps
    /// (logged, not surfaced — a lagged subscriber just resumes from the
    /// next live message, per the bus's at-most-once-per-emit contract).
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "subscriber lagged, resuming");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Default)]
struct BusInner {
    channels: HashMap<String, broadcast::Sender<Message>>,
}

/// In-process pub/sub bus. Cheap to clone (an `Arc` inside); shared across
/// the Coordinator, Lifecycle, and every worker's bus handle.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<RwLock<BusInner>>,
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<Message> {
        {
            let inner = self.inner.read().await;
            if let Some(sender) = inner.channels.get(channel) {
                return sender.clone();
            }
        }
        let mut inner = self.inner.write().await;
        inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes to the message's target channel, mirroring into the
    /// `:all` wiretap unless the target is already broadcast (broadcast
    /// and wiretap would otherwise duplicate every message).
    pub async fn send(&self, message: Message) {
        let channel = message.target.channel(message.swarm_id);
        let sender = self.sender_for(&channel).await;
        let _ = sender.send(message.clone());

        if !matches!(message.target, TargetId::Broadcast) {
            let wiretap = self.sender_for(&wiretap_channel(message.swarm_id)).await;
            let _ = wiretap.send(message);
        }
    }

    pub async fn send_to_worker(
        &self,
        swarm_id: Uuid,
        sender_id: impl Into<String>,
        worker_id: Uuid,
        payload: MessagePayload,
    ) -> Message {
        let message = Message::new(swarm_id, sender_id, TargetId::Worker(worker_id), payload);
        self.send(message.clone()).await;
        message
    }

    pub async fn send_to_master(
        &self,
        swarm_id: Uuid,
        sender_id: impl Into<String>,
        payload: MessagePayload,
    ) -> Message {
        let message = Message::new(swarm_id, sender_id, TargetId::Master, payload);
        self.send(message.clone()).await;
        message
    }

    pub async fn broadcast(
        &self,
        swarm_id: Uuid,
        sender_id: impl Into<String>,
        payload: MessagePayload,
    ) -> Message {
        let message = Message::new(swarm_id, sender_id, TargetId::Broadcast, payload);
        self.send(message.clone()).await;
        message
    }

    /// Convenience wrapper over `send_to_worker` for the `task_assign`
    /// message contract.
    pub async fn assign_task(&self, swarm_id: Uuid, worker_id: Uuid, task: WorkerTask) -> Message {
        self.send_to_worker(
            swarm_id,
            "master",
            worker_id,
            MessagePayload::TaskAssign(Box::new(task)),
        )
        .await
    }

    pub async fn terminate_worker(&self, swarm_id: Uuid, worker_id: Uuid, reason: impl Into<String>) -> Message {
        self.send_to_worker(
            swarm_id,
            "master",
            worker_id,
            MessagePayload::Terminate {
                reason: reason.into(),
            },
        )
        .await
    }

    pub async fn coordinate(&self, swarm_id: Uuid, worker_id: Uuid, action: CoordinationAction) -> Message {
        self.send_to_worker(
            swarm_id,
            "master",
            worker_id,
            MessagePayload::Coordination { action },
        )
        .await
    }

    /// Subscribes to a swarm/target channel. The returned `Subscription`
    /// is the unsubscribe handle: drop it to stop receiving.
    pub async fn subscribe(&self, swarm_id: Uuid, target: TargetId) -> Subscription {
        let channel = target.channel(swarm_id);
        let sender = self.sender_for(&channel).await;
        Subscription {
            channel,
            receiver: sender.subscribe(),
        }
    }

    pub async fn subscribe_wiretap(&self, swarm_id: Uuid) -> Subscription {
        let channel = wiretap_channel(swarm_id);
        let sender = self.sender_for(&channel).await;
        Subscription {
            channel,
            receiver: sender.subscribe(),
        }
    }

    /// Resolves with the first message matching `type_name` seen on the
    /// channel within `timeout`, or `BusError::Timeout`.
    pub async fn wait_for(
        &self,
        swarm_id: Uuid,
        target: TargetId,
        type_name: &str,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        let mut subscription = self.subscribe(swarm_id, target).await;
        tokio::time::timeout(timeout, async {
            loop {
                match subscription.recv().await {
                    Some(message) if message.type_name() == type_name => return Ok(message),
                    Some(_) => continue,
                    None => return Err(BusError::Closed),
                }
            }
        })
        .await
        .map_err(|_| BusError::Timeout(timeout))?
    }

    /// Drops every channel whose name is scoped to `swarm_id`, the bus-side
    /// half of swarm termination: any subscriber still holding a receiver
    /// for one of these channels sees it close.
    pub async fn remove_swarm_listeners(&self, swarm_id: Uuid) {
        let prefix = format!("swarm:{swarm_id}:");
        let mut inner = self.inner.write().await;
        inner.channels.retain(|name, _| !name.starts_with(&prefix));
    }
}

/// Helper shared by worker sessions constructing their outbound messages;
/// kept here rather than on `WorkerTask` since it encodes the wire
/// contract, not the task's own data.
#[must_use]
pub fn task_complete_payload(task_id: Uuid, result: serde_json::Value, metrics: TaskMetrics) -> MessagePayload {
    MessagePayload::TaskComplete {
        task_id,
        success: true,
        result,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::worker_task::TaskMetrics;

    #[tokio::test]
    async fn send_and_receive_on_master_channel() {
        let bus = MessageBus::new();
        let swarm_id = Uuid::new_v4();
        let mut sub = bus.subscribe(swarm_id, TargetId::Master).await;

        bus.send_to_master(
            swarm_id,
            "worker-1",
            MessagePayload::TaskProgress {
                task_id: Uuid::new_v4(),
                progress: 50,
                current_action: None,
                step_index: None,
                total_steps: None,
            },
        )
        .await;

        let received = sub.recv().await.expect("message delivered");
        assert_eq!(received.type_name(), "task_progress");
    }

    #[tokio::test]
    async fn non_broadcast_send_mirrors_to_wiretap() {
        let bus = MessageBus::new();
        let swarm_id = Uuid::new_v4();
        let mut wiretap = bus.subscribe_wiretap(swarm_id).await;

        bus.send_to_master(
            swarm_id,
            "worker-1",
            MessagePayload::Heartbeat {
                worker_id: Uuid::new_v4(),
                state: "running".to_string(),
                progress: 10,
                timestamp: chrono::Utc::now(),
            },
        )
        .await;

        let mirrored = wiretap.recv().await.expect("wiretap sees it too");
        assert_eq!(mirrored.type_name(), "heartbeat");
    }

    #[tokio::test]
    async fn broadcast_does_not_double_mirror() {
        let bus = MessageBus::new();
        let swarm_id = Uuid::new_v4();
        let mut wiretap = bus.subscribe_wiretap(swarm_id).await;
        let mut broadcast_sub = bus.subscribe(swarm_id, TargetId::Broadcast).await;

        bus.broadcast(
            swarm_id,
            "master",
            MessagePayload::Coordination {
                action: CoordinationAction::Pause,
            },
        )
        .await;

        broadcast_sub.recv().await.expect("broadcast channel gets it");
        wiretap.recv().await.expect("wiretap mirrors broadcasts too (only self-mirroring is excluded)");
    }

    #[tokio::test]
    async fn wait_for_times_out_with_no_match() {
        let bus = MessageBus::new();
        let swarm_id = Uuid::new_v4();
        let result = bus
            .wait_for(swarm_id, TargetId::Master, "task_complete", Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(BusError::Timeout(_))));
    }

    #[tokio::test]
    async fn wait_for_resolves_on_matching_type() {
        let bus = MessageBus::new();
        let swarm_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.wait_for(swarm_id, TargetId::Master, "task_complete", Duration::from_secs(1))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.send_to_master(
            swarm_id,
            "worker-1",
            MessagePayload::TaskComplete {
                task_id,
                success: true,
                result: serde_json::json!({"ok": true}),
                metrics: TaskMetrics::default(),
            },
        )
        .await;

        let message = waiter.await.unwrap().expect("matched");
        assert_eq!(message.type_name(), "task_complete");
    }

    #[tokio::test]
    async fn remove_swarm_listeners_closes_subscriptions() {
        let bus = MessageBus::new();
        let swarm_id = Uuid::new_v4();
        let mut sub = bus.subscribe(swarm_id, TargetId::Master).await;

        bus.remove_swarm_listeners(swarm_id).await;
        bus.send_to_master(
            swarm_id,
            "worker-1",
            MessagePayload::Heartbeat {
                worker_id: Uuid::new_v4(),
                state: "running".to_string(),
                progress: 0,
                timestamp: chrono::Utc::now(),
            },
        )
        .await;

        assert!(sub.recv().await.is_none(), "channel was torn down, old sender is orphaned");
    }
}
