//! Application layer: the Swarm Service facade (C12), the single entry
//! point external callers go through. Everything under `services::*` is
//! reachable directly, but the facade is the supported admission path —
//! it's the only thing that applies the Resilience Kit and forwards a
//! single `swarm_event` stream.

pub mod swarm_service;
