//! Hierarchical configuration for the swarm service, following the same
//! figment-based merge order the wider ecosystem uses: programmatic
//! defaults, then an optional YAML file, then environment variables.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::swarm::CpuPriority;
use crate::infrastructure::logging::config::LogConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_workers ({0}) must be between 1 and {1}")]
    InvalidMaxWorkers(u32, u32),

    #[error("default_workers ({0}) must be between min_workers ({1}) and max_workers ({2})")]
    InvalidDefaultWorkers(u32, u32, u32),

    #[error("max_concurrent_swarms must be at least 1")]
    InvalidMaxConcurrentSwarms,

    #[error("{field} must be positive, got {value}")]
    NonPositiveDuration { field: &'static str, value: u64 },

    #[error("retry.exponential_factor must be > 1.0, got {0}")]
    InvalidExponentialFactor(f64),

    #[error("queue.aging_factor_per_minute must be >= 0, got {0}")]
    InvalidAgingFactor(f64),

    #[error("bulkhead.max_concurrent must be at least 1")]
    InvalidBulkheadConcurrency,

    #[error("circuit_breaker.failure_threshold must be at least 1")]
    InvalidFailureThreshold,

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Top-level configuration for the swarm orchestration service. Every
/// tunable with a configurable default has a field here; nested
/// structs group the knobs owned by each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SwarmServiceConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    #[serde(default = "default_default_workers")]
    pub default_workers: u32,
    #[serde(default = "default_min_workers")]
    pub min_workers: u32,
    #[serde(default = "default_max_retries_per_worker")]
    pub max_retries_per_worker: u32,
    #[serde(default = "default_worker_memory_mb")]
    pub worker_memory_mb: u64,
    #[serde(default = "default_max_concurrent_swarms")]
    pub max_concurrent_swarms: u32,
    #[serde(default = "default_worker_spawn_ms")]
    pub worker_spawn_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_task_default_ms")]
    pub task_default_ms: u64,
    #[serde(default = "default_swarm_default_ms")]
    pub swarm_default_ms: u64,
    #[serde(default = "default_progress_stale_ms")]
    pub progress_stale_ms: u64,
    #[serde(default = "default_cpu_priority")]
    pub default_cpu_priority: CpuPriority,

    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub load_balancer: LoadBalancerSettings,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub bulkhead: BulkheadSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub logging: LogConfig,
}

const fn default_max_workers() -> u32 {
    10
}
const fn default_default_workers() -> u32 {
    5
}
const fn default_min_workers() -> u32 {
    1
}
const fn default_max_retries_per_worker() -> u32 {
    3
}
const fn default_worker_memory_mb() -> u64 {
    512
}
const fn default_max_concurrent_swarms() -> u32 {
    3
}
const fn default_worker_spawn_ms() -> u64 {
    10_000
}
const fn default_heartbeat_interval_ms() -> u64 {
    5_000
}
const fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}
const fn default_task_default_ms() -> u64 {
    300_000
}
const fn default_swarm_default_ms() -> u64 {
    600_000
}
const fn default_progress_stale_ms() -> u64 {
    60_000
}
const fn default_cpu_priority() -> CpuPriority {
    CpuPriority::Normal
}

impl Default for SwarmServiceConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            default_workers: default_default_workers(),
            min_workers: default_min_workers(),
            max_retries_per_worker: default_max_retries_per_worker(),
            worker_memory_mb: default_worker_memory_mb(),
            max_concurrent_swarms: default_max_concurrent_swarms(),
            worker_spawn_ms: default_worker_spawn_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            task_default_ms: default_task_default_ms(),
            swarm_default_ms: default_swarm_default_ms(),
            progress_stale_ms: default_progress_stale_ms(),
            default_cpu_priority: default_cpu_priority(),
            retry: RetrySettings::default(),
            queue: QueueSettings::default(),
            load_balancer: LoadBalancerSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            bulkhead: BulkheadSettings::default(),
            pool: PoolSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Default retry-with-backoff parameters, shared by worker respawn and the
/// generic `retry_with_backoff` resilience helper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrySettings {
    #[serde(default = "default_retry_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_factor")]
    pub exponential_factor: f64,
    #[serde(default = "default_retry_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

const fn default_retry_base_ms() -> u64 {
    1_000
}
const fn default_retry_max_ms() -> u64 {
    10_000
}
const fn default_retry_factor() -> f64 {
    2.0
}
const fn default_retry_max_retries() -> u32 {
    3
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_retry_base_ms(),
            max_delay_ms: default_retry_max_ms(),
            exponential_factor: default_retry_factor(),
            max_retries: default_retry_max_retries(),
            jitter: true,
        }
    }
}

/// Priority queue scoring knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueSettings {
    #[serde(default = "default_aging_factor")]
    pub aging_factor_per_minute: f64,
    #[serde(default = "default_preempt_bonus")]
    pub preempt_bonus: f64,
}

const fn default_aging_factor() -> f64 {
    5.0
}
const fn default_preempt_bonus() -> f64 {
    50.0
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            aging_factor_per_minute: default_aging_factor(),
            preempt_bonus: default_preempt_bonus(),
        }
    }
}

/// Load balancer thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoadBalancerSettings {
    #[serde(default = "default_min_health_score")]
    pub min_health_score: f64,
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
}

const fn default_min_health_score() -> f64 {
    20.0
}
const fn default_default_weight() -> f64 {
    1.0
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            min_health_score: default_min_health_score(),
            default_weight: default_default_weight(),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

const fn default_failure_threshold() -> u32 {
    3
}
const fn default_failure_window_ms() -> u64 {
    60_000
}
const fn default_reset_timeout_ms() -> u64 {
    30_000
}
const fn default_half_open_max_calls() -> u32 {
    1
}
const fn default_success_threshold() -> u32 {
    2
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_ms: default_failure_window_ms(),
            reset_timeout_ms: default_reset_timeout_ms(),
            half_open_max_calls: default_half_open_max_calls(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// Bulkhead limits guarding the Service facade's admission point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BulkheadSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    #[serde(default = "default_max_queue")]
    pub max_queue: u32,
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

const fn default_max_concurrent() -> u32 {
    3
}
const fn default_max_queue() -> u32 {
    10
}
const fn default_queue_timeout_ms() -> u64 {
    30_000
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue: default_max_queue(),
            queue_timeout_ms: default_queue_timeout_ms(),
        }
    }
}

/// Worker pool sizing and cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolSettings {
    #[serde(default = "default_pool_min_workers")]
    pub min_workers: u32,
    #[serde(default = "default_pool_max_workers")]
    pub max_workers: u32,
    #[serde(default = "default_warm_pool_ratio")]
    pub warm_pool_ratio: f64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_warmup_timeout_ms")]
    pub warmup_timeout_ms: u64,
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,
    #[serde(default = "default_scale_cooldown_ms")]
    pub scale_cooldown_ms: u64,
}

const fn default_pool_min_workers() -> u32 {
    1
}
const fn default_pool_max_workers() -> u32 {
    10
}
const fn default_warm_pool_ratio() -> f64 {
    0.5
}
const fn default_idle_timeout_ms() -> u64 {
    120_000
}
const fn default_warmup_timeout_ms() -> u64 {
    10_000
}
const fn default_maintenance_interval_ms() -> u64 {
    30_000
}
const fn default_scale_up_threshold() -> f64 {
    0.8
}
const fn default_scale_down_threshold() -> f64 {
    0.2
}
const fn default_scale_cooldown_ms() -> u64 {
    60_000
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_workers: default_pool_min_workers(),
            max_workers: default_pool_max_workers(),
            warm_pool_ratio: default_warm_pool_ratio(),
            idle_timeout_ms: default_idle_timeout_ms(),
            warmup_timeout_ms: default_warmup_timeout_ms(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            scale_cooldown_ms: default_scale_cooldown_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`)
    /// 2. `swarmcore.yaml` (optional)
    /// 3. Environment variables (`SWARM_` prefix, highest priority)
    pub fn load() -> Result<SwarmServiceConfig> {
        let config: SwarmServiceConfig = Figment::new()
            .merge(Serialized::defaults(SwarmServiceConfig::default()))
            .merge(Yaml::file("swarmcore.yaml"))
            .merge(Env::prefixed("SWARM_").split("__"))
            .extract()
            .context("failed to extract swarm service configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring defaults and
    /// environment overrides. Used by tests and by callers embedding the
    /// core with a non-default config path.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmServiceConfig> {
        let config: SwarmServiceConfig = Figment::new()
            .merge(Serialized::defaults(SwarmServiceConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("SWARM_").split("__"))
            .extract()
            .context("failed to extract swarm service configuration from file")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate semantic invariants figment's deserialization can't enforce
    /// on its own (ranges, cross-field ordering).
    pub fn validate(config: &SwarmServiceConfig) -> Result<(), ConfigError> {
        if config.max_workers == 0 || config.max_workers > 10 {
            return Err(ConfigError::InvalidMaxWorkers(config.max_workers, 10));
        }
        if config.default_workers < config.min_workers || config.default_workers > config.max_workers {
            return Err(ConfigError::InvalidDefaultWorkers(
                config.default_workers,
                config.min_workers,
                config.max_workers,
            ));
        }
        if config.max_concurrent_swarms == 0 {
            return Err(ConfigError::InvalidMaxConcurrentSwarms);
        }
        for (field, value) in [
            ("worker_spawn_ms", config.worker_spawn_ms),
            ("heartbeat_interval_ms", config.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", config.heartbeat_timeout_ms),
            ("task_default_ms", config.task_default_ms),
            ("swarm_default_ms", config.swarm_default_ms),
            ("progress_stale_ms", config.progress_stale_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositiveDuration { field, value });
            }
        }
        if config.retry.exponential_factor <= 1.0 {
            return Err(ConfigError::InvalidExponentialFactor(
                config.retry.exponential_factor,
            ));
        }
        if config.queue.aging_factor_per_minute < 0.0 {
            return Err(ConfigError::InvalidAgingFactor(
                config.queue.aging_factor_per_minute,
            ));
        }
        if config.bulkhead.max_concurrent == 0 {
            return Err(ConfigError::InvalidBulkheadConcurrency);
        }
        if config.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold);
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = SwarmServiceConfig::default();
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.default_workers, 5);
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_retries_per_worker, 3);
        assert_eq!(config.worker_memory_mb, 512);
        assert_eq!(config.max_concurrent_swarms, 3);
        assert_eq!(config.worker_spawn_ms, 10_000);
        assert_eq!(config.heartbeat_interval_ms, 5_000);
        assert_eq!(config.heartbeat_timeout_ms, 15_000);
        assert_eq!(config.task_default_ms, 300_000);
        assert_eq!(config.swarm_default_ms, 600_000);
        assert_eq!(config.progress_stale_ms, 60_000);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert!((config.retry.exponential_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(ConfigLoader::validate(&SwarmServiceConfig::default()).is_ok());
    }

    #[test]
    fn rejects_max_workers_out_of_range() {
        let config = SwarmServiceConfig {
            max_workers: 11,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxWorkers(11, 10))
        ));
    }

    #[test]
    fn rejects_default_workers_out_of_bounds() {
        let config = SwarmServiceConfig {
            default_workers: 20,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidDefaultWorkers(..))
        ));
    }

    #[test]
    fn rejects_zero_concurrent_swarms() {
        let config = SwarmServiceConfig {
            max_concurrent_swarms: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrentSwarms)
        ));
    }

    #[test]
    fn rejects_bad_retry_factor() {
        let config = SwarmServiceConfig {
            retry: RetrySettings {
                exponential_factor: 1.0,
                ..RetrySettings::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidExponentialFactor(_))
        ));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = SwarmServiceConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
