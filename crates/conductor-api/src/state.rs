//! Application state wiring the engine to its SQLite store.
//!
//! The engine is generic over `ExecutionStore`; AppState pins it to the
//! concrete infra implementation and applies command-line overrides to the
//! `[engine]` section of config.toml.

use std::path::PathBuf;

use conductor_core::workflow::WorkflowEngine;
use conductor_infra::filesystem::ensure_data_dir;
use conductor_infra::sqlite::execution::SqliteExecutionStore;
use conductor_infra::sqlite::pool::DatabasePool;
use conductor_types::config::{EngineConfig, GlobalConfig};

use crate::cli::EngineOverrides;

/// Engine pinned to the SQLite execution store.
pub type ConcreteEngine = WorkflowEngine<SqliteExecutionStore>;

/// Shared state for CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: ensure the data dir, connect to the DB.
    pub async fn init(data_dir: PathBuf, config: GlobalConfig) -> anyhow::Result<Self> {
        ensure_data_dir(&data_dir).await?;
        let db_pool = DatabasePool::open(&data_dir).await?;

        Ok(Self {
            data_dir,
            config,
            db_pool,
        })
    }

    pub fn store(&self) -> SqliteExecutionStore {
        SqliteExecutionStore::new(self.db_pool.clone())
    }

    /// A fresh engine with config.toml settings plus `overrides`.
    pub fn engine(&self, overrides: &EngineOverrides) -> ConcreteEngine {
        WorkflowEngine::new(self.store(), engine_config(&self.config.engine, overrides))
    }
}

/// Apply command-line overrides on top of the file configuration.
pub fn engine_config(base: &EngineConfig, overrides: &EngineOverrides) -> EngineConfig {
    let mut config = base.clone();
    if let Some(parallelism) = overrides.parallelism {
        config.max_parallelism = parallelism.max(1);
    }
    if let Some(policy) = overrides.policy {
        config.failure_policy = policy.into();
    }
    if overrides.no_timeouts {
        config.enforce_timeouts = false;
    }
    if let Some(unit_ms) = overrides.backoff_ms {
        config.backoff.unit_ms = unit_ms;
    }
    config
}
