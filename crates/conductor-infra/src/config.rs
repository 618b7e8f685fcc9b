//! Global configuration loader for Conductor.
//!
//! Reads `config.toml` from the data directory (`~/.conductor/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::Path;

use conductor_types::config::GlobalConfig;

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::config::{FailurePolicy, LogFormat};
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.engine.max_parallelism, 1);
        assert_eq!(config.engine.backoff.unit_ms, 1000);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[engine]
failure_policy = "skip_dependents"
max_parallelism = 4
enforce_timeouts = false

[engine.backoff]
unit_ms = 250
max_ms = 10000

[logging]
format = "json"
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.failure_policy, FailurePolicy::SkipDependents);
        assert_eq!(config.engine.max_parallelism, 4);
        assert!(!config.engine.enforce_timeouts);
        assert_eq!(config.engine.backoff.unit_ms, 250);
        assert_eq!(config.engine.backoff.max_ms, Some(10_000));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[tokio::test]
    async fn load_global_config_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "[engine]\nmax_parallelism = 2\n")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.max_parallelism, 2);
        assert!(config.engine.enforce_timeouts);
        assert!(!config.logging.otel);
    }
}
