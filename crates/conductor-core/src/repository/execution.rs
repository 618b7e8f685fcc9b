//! Execution store trait and an in-memory implementation.
//!
//! The engine writes whole `WorkflowExecution` snapshots through this port.
//! `save` is an upsert keyed by execution id, so writing the same snapshot
//! twice leaves exactly one stored record. The SQLite implementation lives in
//! conductor-infra.

use std::future::Future;

use conductor_types::error::RepositoryError;
use conductor_types::execution::{ExecutionState, WorkflowExecution};
use dashmap::DashMap;
use uuid::Uuid;

/// Storage port for execution snapshots.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionStore: Send + Sync {
    /// Insert or replace the snapshot for `execution.execution_id`.
    fn save(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a snapshot by id.
    fn load(
        &self,
        execution_id: &Uuid,
    ) -> impl Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Most recent executions first, optionally filtered by workflow.
    fn list(
        &self,
        workflow_id: Option<&str>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    /// Every execution currently in `state`, oldest first.
    fn list_by_state(
        &self,
        state: ExecutionState,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store holding serialized snapshots.
///
/// Snapshots are kept as JSON so a load observes exactly what a durable
/// backend would return, including serde defaults.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: DashMap<Uuid, String>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn decode_all(&self) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        self.records
            .iter()
            .map(|entry| decode(entry.value()))
            .collect()
    }
}

fn decode(json: &str) -> Result<WorkflowExecution, RepositoryError> {
    serde_json::from_str(json)
        .map_err(|e| RepositoryError::Query(format!("corrupt execution snapshot: {e}")))
}

impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(execution)
            .map_err(|e| RepositoryError::Query(format!("serialize execution: {e}")))?;
        self.records.insert(execution.execution_id, json);
        Ok(())
    }

    async fn load(&self, execution_id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        self.records
            .get(execution_id)
            .map(|json| decode(json.value()))
            .transpose()
    }

    async fn list(
        &self,
        workflow_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut all: Vec<_> = self
            .decode_all()?
            .into_iter()
            .filter(|e| workflow_id.is_none_or(|wf| e.workflow_id == wf))
            .collect();
        // UUIDv7 ids sort by creation time.
        all.sort_by(|a, b| b.execution_id.cmp(&a.execution_id));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn list_by_state(
        &self,
        state: ExecutionState,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut matching: Vec<_> = self
            .decode_all()?
            .into_iter()
            .filter(|e| e.state == state)
            .collect();
        matching.sort_by_key(|e| e.execution_id);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::execution::TaskRun;
    use serde_json::json;

    fn execution(workflow_id: &str) -> WorkflowExecution {
        let mut exec = WorkflowExecution::new(workflow_id);
        exec.task_runs
            .insert("a".into(), TaskRun::new("a", vec![]));
        exec.context.insert("input".into(), json!(1));
        exec
    }

    #[tokio::test]
    async fn save_then_load_returns_equal_snapshot() {
        let store = InMemoryExecutionStore::new();
        let exec = execution("wf");
        store.save(&exec).await.unwrap();
        assert_eq!(store.load(&exec.execution_id).await.unwrap(), Some(exec));
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = InMemoryExecutionStore::new();
        let mut exec = execution("wf");
        store.save(&exec).await.unwrap();
        store.save(&exec).await.unwrap();
        assert_eq!(store.len(), 1);

        exec.state = ExecutionState::Running;
        store.save(&exec).await.unwrap();
        let loaded = store.load(&exec.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, ExecutionState::Running);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let store = InMemoryExecutionStore::new();
        assert!(store.load(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let store = InMemoryExecutionStore::new();
        let first = execution("ingest");
        let second = execution("report");
        let third = execution("ingest");
        for e in [&first, &second, &third] {
            store.save(e).await.unwrap();
        }

        let ingest = store.list(Some("ingest"), 10).await.unwrap();
        let ids: Vec<_> = ingest.iter().map(|e| e.execution_id).collect();
        assert_eq!(ids, vec![third.execution_id, first.execution_id]);

        assert_eq!(store.list(None, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_by_state_matches_only_that_state() {
        let store = InMemoryExecutionStore::new();
        let mut running = execution("wf");
        running.state = ExecutionState::Running;
        let done = execution("wf");
        store.save(&running).await.unwrap();
        store.save(&done).await.unwrap();

        let found = store.list_by_state(ExecutionState::Running).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].execution_id, running.execution_id);
    }
}
