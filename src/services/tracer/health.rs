//! Pluggable health checks (part of C11): an ordered list of named,
//! independently pluggable probes, each flagged `critical` or not, rolled
//! up into one overall status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

pub type CheckFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type CheckFn = Arc<dyn Fn() -> CheckFuture + Send + Sync>;

#[derive(Clone)]
pub struct HealthCheck {
    pub name: String,
    pub critical: bool,
    check: CheckFn,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, critical: bool, check: CheckFn) -> Self {
        Self {
            name: name.into(),
            critical,
            check,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub critical: bool,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<CheckResult>,
}

/// Ordered registry of checks; `run` evaluates every check in
/// registration order and folds the results into one overall status.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checks: Vec<HealthCheck>,
}

impl HealthRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn register(&mut self, check: HealthCheck) {
        self.checks.push(check);
    }

    /// Overall status is `unhealthy` if any critical check fails,
    /// `degraded` if any non-critical check fails, else `healthy`.
    pub async fn run(&self) -> HealthReport {
        let mut results = Vec::with_capacity(self.checks.len());
        let mut any_critical_failed = false;
        let mut any_failed = false;

        for check in &self.checks {
            let outcome = (check.check)().await;
            let ok = outcome.is_ok();
            if !ok {
                any_failed = true;
                if check.critical {
                    any_critical_failed = true;
                }
            }
            results.push(CheckResult {
                name: check.name.clone(),
                critical: check.critical,
                ok,
                error: outcome.err(),
            });
        }

        let status = if any_critical_failed {
            HealthStatus::Unhealthy
        } else if any_failed {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, checks: results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_check(name: &str, critical: bool) -> HealthCheck {
        HealthCheck::new(name, critical, Arc::new(|| Box::pin(async { Ok(()) })))
    }

    fn failing_check(name: &str, critical: bool) -> HealthCheck {
        HealthCheck::new(name, critical, Arc::new(|| Box::pin(async { Err("down".to_string()) })))
    }

    #[tokio::test]
    async fn all_passing_checks_are_healthy() {
        let mut registry = HealthRegistry::new();
        registry.register(ok_check("bus", true));
        registry.register(ok_check("pool", false));

        let report = registry.run().await;
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn failing_non_critical_check_is_degraded() {
        let mut registry = HealthRegistry::new();
        registry.register(ok_check("bus", true));
        registry.register(failing_check("pool", false));

        let report = registry.run().await;
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn failing_critical_check_is_unhealthy_even_if_others_pass() {
        let mut registry = HealthRegistry::new();
        registry.register(failing_check("bus", true));
        registry.register(ok_check("pool", false));

        let report = registry.run().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.checks.iter().any(|c| c.name == "bus" && !c.ok));
    }
}
