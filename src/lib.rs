//! Swarm orchestration core: task decomposition, worker supervision, and
//! result aggregation behind one facade.
//!
//! - [`domain`] holds the models, capability ports, and error taxonomy.
//! - [`services`] holds the eleven components the core is built from.
//! - [`application`] holds the Swarm Service facade (C12) external
//!   callers should go through.
//! - [`infrastructure`] holds configuration loading and structured
//!   logging, the ambient concerns neither layer above depends on.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::swarm_service::{ServiceError, SwarmService};
pub use domain::errors::{DomainResult, SwarmError};
