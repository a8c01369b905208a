//! The execution-phase monitoring loop: subscribes to a swarm's master
//! channel, applies each message via `event_handling`, and re-checks
//! completion ("no active workers remain") after every state-affecting
//! message. Bounded by `config.swarmTimeoutMs` and cancellable.

use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use crate::domain::models::worker::WorkerState;
use crate::domain::models::TargetId;
use crate::services::message_bus::MessageBus;
use crate::services::swarm_registry::SwarmRegistry;

use super::event_handling;
use super::types::SwarmEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MonitorOutcome {
    Completed,
    AllFailed,
    TimedOut,
    Cancelled,
}

pub(super) async fn run(
    registry: &SwarmRegistry,
    bus: &MessageBus,
    events: &broadcast::Sender<SwarmEvent>,
    swarm_id: Uuid,
    timeout: Duration,
    cancel: &Notify,
) -> MonitorOutcome {
    tokio::select! {
        outcome = monitor_loop(registry, bus, events, swarm_id) => outcome,
        () = tokio::time::sleep(timeout) => MonitorOutcome::TimedOut,
        () = cancel.notified() => MonitorOutcome::Cancelled,
    }
}

async fn monitor_loop(
    registry: &SwarmRegistry,
    bus: &MessageBus,
    events: &broadcast::Sender<SwarmEvent>,
    swarm_id: Uuid,
) -> MonitorOutcome {
    let mut subscription = bus.subscribe(swarm_id, TargetId::Master).await;

    if let Some(outcome) = check_completion(registry, swarm_id).await {
        return outcome;
    }

    loop {
        let Some(message) = subscription.recv().await else {
            return MonitorOutcome::Completed;
        };

        match event_handling::apply(registry, events, swarm_id, message).await {
            Ok(true) => {
                if let Some(outcome) = check_completion(registry, swarm_id).await {
                    return outcome;
                }
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(%swarm_id, %error, "failed to apply worker message during monitoring");
            }
        }
    }
}

/// `None` while workers remain active; `Some` once the swarm is done,
/// distinguishing "at least one worker completed" from "every worker
/// that finished, finished failed".
async fn check_completion(registry: &SwarmRegistry, swarm_id: Uuid) -> Option<MonitorOutcome> {
    let active = registry.active_worker_ids(swarm_id).await.ok()?;
    if !active.is_empty() {
        return None;
    }

    let swarm = registry.get(swarm_id).await.ok()?;
    let any_completed = swarm.workers.values().any(|w| w.state == WorkerState::Completed);
    Some(if any_completed { MonitorOutcome::Completed } else { MonitorOutcome::AllFailed })
}
