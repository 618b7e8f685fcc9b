//! SQLite execution store implementation.
//!
//! Implements `ExecutionStore` from `conductor-core` using sqlx with split
//! read/write pools. Scalar fields live in their own columns so executions
//! can be filtered by workflow and state; task runs, context, audit log, and
//! error are stored as JSON blobs.

use conductor_core::repository::execution::ExecutionStore;
use conductor_types::error::RepositoryError;
use conductor_types::execution::{ExecutionState, WorkflowExecution};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionStore`.
pub struct SqliteExecutionStore {
    pool: DatabasePool,
}

impl SqliteExecutionStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    workflow_id: String,
    state: String,
    context: String,
    task_runs: String,
    audit_log: String,
    error: Option<String>,
    started_at: Option<String>,
    ended_at: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            state: row.try_get("state")?,
            context: row.try_get("context")?,
            task_runs: row.try_get("task_runs")?,
            audit_log: row.try_get("audit_log")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        let state: ExecutionState = self
            .state
            .parse()
            .map_err(RepositoryError::Query)?;

        Ok(WorkflowExecution {
            execution_id: parse_uuid(&self.id)?,
            workflow_id: self.workflow_id,
            state,
            context: parse_json("context", &self.context)?,
            task_runs: parse_json("task_runs", &self.task_runs)?,
            audit_log: parse_json("audit_log", &self.audit_log)?,
            start_time: self.started_at.as_deref().map(parse_datetime).transpose()?,
            end_time: self.ended_at.as_deref().map(parse_datetime).transpose()?,
            error: self
                .error
                .as_deref()
                .map(|e| parse_json("error", e))
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_json<T: serde::de::DeserializeOwned>(column: &str, s: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s)
        .map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Query(format!("serialize {column}: {e}")))
}

fn rows_to_executions(
    rows: Vec<sqlx::sqlite::SqliteRow>,
) -> Result<Vec<WorkflowExecution>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ExecutionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_execution()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ExecutionStore implementation
// ---------------------------------------------------------------------------

impl ExecutionStore for SqliteExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let context = to_json("context", &execution.context)?;
        let task_runs = to_json("task_runs", &execution.task_runs)?;
        let audit_log = to_json("audit_log", &execution.audit_log)?;
        let error = execution
            .error
            .as_ref()
            .map(|e| to_json("error", e))
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO executions
                 (id, workflow_id, state, context, task_runs, audit_log, error, started_at, ended_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 state = excluded.state,
                 context = excluded.context,
                 task_runs = excluded.task_runs,
                 audit_log = excluded.audit_log,
                 error = excluded.error,
                 started_at = excluded.started_at,
                 ended_at = excluded.ended_at,
                 updated_at = excluded.updated_at"#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.workflow_id)
        .bind(execution.state.to_string())
        .bind(&context)
        .bind(&task_runs)
        .bind(&audit_log)
        .bind(&error)
        .bind(execution.start_time.as_ref().map(format_datetime))
        .bind(execution.end_time.as_ref().map(format_datetime))
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution.execution_id,
            state = %execution.state,
            "execution snapshot saved"
        );
        Ok(())
    }

    async fn load(&self, execution_id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(ref r) => {
                let row = ExecutionRow::from_row(r)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(row.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        workflow_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        // UUIDv7 text sorts by creation time.
        let rows = match workflow_id {
            Some(wf) => {
                sqlx::query(
                    "SELECT * FROM executions WHERE workflow_id = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(wf)
                .bind(limit as i64)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM executions ORDER BY id DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_executions(rows)
    }

    async fn list_by_state(
        &self,
        state: ExecutionState,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM executions WHERE state = ? ORDER BY id ASC")
            .bind(state.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_executions(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::audit::{AuditEntry, AuditEvent};
    use conductor_types::execution::{ExecutionFailure, TaskRun, TaskState};
    use serde_json::json;

    async fn test_store() -> (SqliteExecutionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(dir.path()).await.unwrap();
        (SqliteExecutionStore::new(pool), dir)
    }

    fn failed_execution(workflow_id: &str) -> WorkflowExecution {
        let mut exec = WorkflowExecution::new(workflow_id);
        exec.state = ExecutionState::Failed;
        exec.start_time = Some(Utc::now());
        exec.end_time = Some(Utc::now());
        exec.context.insert("input".into(), json!({"path": "report.pdf"}));

        let mut a = TaskRun::new("a", vec![]);
        a.state = TaskState::Completed;
        a.result = Some(json!(42));
        a.start_time = exec.start_time;
        a.end_time = exec.end_time;
        a.attempts = 1;
        let mut b = TaskRun::new("b", vec!["a".into()]);
        b.state = TaskState::Failed;
        b.error = Some("boom".into());
        b.retry_count = 2;
        b.attempts = 2;
        exec.task_runs.insert("a".into(), a);
        exec.task_runs.insert("b".into(), b);

        exec.audit_log.push(AuditEntry {
            timestamp: Utc::now(),
            execution_id: exec.execution_id,
            event: AuditEvent::WorkflowStarted,
            task_id: None,
            details: json!({ "tasks": 2 }),
        });
        exec.error = Some(ExecutionFailure::TaskFailed {
            task_id: "b".into(),
            retry_count: 2,
            attempts_exhausted: true,
            message: "boom".into(),
        });
        exec
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let (store, _dir) = test_store().await;
        let exec = failed_execution("report");

        store.save(&exec).await.unwrap();
        let loaded = store.load(&exec.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded, exec);
    }

    #[tokio::test]
    async fn test_save_twice_is_idempotent() {
        let (store, _dir) = test_store().await;
        let exec = failed_execution("report");

        store.save(&exec).await.unwrap();
        let first = store.load(&exec.execution_id).await.unwrap();
        store.save(&exec).await.unwrap();
        let second = store.load(&exec.execution_id).await.unwrap();
        assert_eq!(first, second);

        let all = store.list(None, 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_save_overwrites_state() {
        let (store, _dir) = test_store().await;
        let mut exec = WorkflowExecution::new("report");
        exec.state = ExecutionState::Running;
        store.save(&exec).await.unwrap();

        exec.state = ExecutionState::Completed;
        exec.end_time = Some(Utc::now());
        store.save(&exec).await.unwrap();

        let loaded = store.load(&exec.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, ExecutionState::Completed);
        assert!(loaded.end_time.is_some());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let (store, _dir) = test_store().await;
        assert!(store.load(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filter() {
        let (store, _dir) = test_store().await;
        let older = failed_execution("report");
        let other = failed_execution("ingest");
        let newer = failed_execution("report");
        for e in [&older, &other, &newer] {
            store.save(e).await.unwrap();
        }

        let reports = store.list(Some("report"), 10).await.unwrap();
        let ids: Vec<_> = reports.iter().map(|e| e.execution_id).collect();
        assert_eq!(ids, vec![newer.execution_id, older.execution_id]);

        let limited = store.list(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].execution_id, newer.execution_id);
    }

    #[tokio::test]
    async fn test_list_by_state() {
        let (store, _dir) = test_store().await;
        let mut running = WorkflowExecution::new("report");
        running.state = ExecutionState::Running;
        store.save(&running).await.unwrap();
        store.save(&failed_execution("report")).await.unwrap();

        let found = store.list_by_state(ExecutionState::Running).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].execution_id, running.execution_id);
        assert!(
            store
                .list_by_state(ExecutionState::Cancelled)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
