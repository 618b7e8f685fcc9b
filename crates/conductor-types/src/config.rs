//! Configuration types for Conductor.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! engine's scheduling policy and the logging pipeline. Every field has a
//! default so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `~/.conductor/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// What happens to the rest of an execution once a task fails permanently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop dispatching immediately; the execution fails.
    #[default]
    FailFast,
    /// Skip the failed task's dependents, keep running independent branches.
    SkipDependents,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Maximum tasks running at once within a ready round (1 = sequential).
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Abort an attempt that outlives its task's declared timeout.
    #[serde(default = "default_true")]
    pub enforce_timeouts: bool,
    /// Persist a snapshot on every transition, not only terminal ones.
    #[serde(default)]
    pub persist_every_transition: bool,
}

fn default_max_parallelism() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_parallelism: default_max_parallelism(),
            backoff: BackoffConfig::default(),
            enforce_timeouts: true,
            persist_every_transition: false,
        }
    }
}

/// Exponential backoff: `2^attempt * unit`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// One backoff time unit in milliseconds.
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
    /// Upper bound on a single backoff delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<u64>,
}

fn default_unit_ms() -> u64 {
    1000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            unit_ms: default_unit_ms(),
            max_ms: None,
        }
    }
}

impl BackoffConfig {
    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Bridge spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.engine.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.engine.max_parallelism, 1);
        assert_eq!(config.engine.backoff.unit_ms, 1000);
        assert!(config.engine.backoff.max_ms.is_none());
        assert!(config.engine.enforce_timeouts);
        assert!(!config.engine.persist_every_transition);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_parallelism, 1);
        assert!(config.engine.enforce_timeouts);
        assert!(!config.logging.otel);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[engine]
failure_policy = "skip_dependents"
max_parallelism = 4
enforce_timeouts = false

[engine.backoff]
unit_ms = 50
max_ms = 2000

[logging]
format = "json"
otel = true
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.failure_policy, FailurePolicy::SkipDependents);
        assert_eq!(config.engine.max_parallelism, 4);
        assert!(!config.engine.enforce_timeouts);
        assert_eq!(config.engine.backoff.unit_ms, 50);
        assert_eq!(config.engine.backoff.max_ms, Some(2000));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.logging.otel);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = toml::from_str::<GlobalConfig>("[engine]\nfailure_policy = \"yolo\"\n");
        assert!(result.is_err());
    }
}
