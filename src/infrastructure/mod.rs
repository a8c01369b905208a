//! Infrastructure layer: ambient concerns with no domain behavior of their
//! own — configuration loading and structured logging. Everything the
//! core actually does lives in `services::*`; this module only wires up
//! the plumbing around it.

pub mod config;
pub mod logging;
