//! Error types for workflow validation and execution.

use conductor_types::error::{RepositoryError, TransitionError};
use conductor_types::execution::{ExecutionFailure, ExecutionState};
use thiserror::Error;
use uuid::Uuid;

/// Structural problems with a task set, detected before any execution.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Two tasks share an id.
    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),

    /// A task depends on an id that is not in the task set.
    #[error("unknown dependency: task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// Dependency graph contains a cycle.
    #[error("cycle detected involving task '{0}'")]
    CycleDetected(String),

    /// Manifest YAML failed to parse.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Manifest violates a structural rule (id format, timeout).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A task that exhausted its attempts (or was abandoned mid-retry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task '{task_id}' failed after {retry_count} failed attempt(s): {message}")]
pub struct TaskExecutionError {
    pub task_id: String,
    pub retry_count: u32,
    pub attempts_exhausted: bool,
    pub message: String,
}

impl From<TaskExecutionError> for ExecutionFailure {
    fn from(err: TaskExecutionError) -> Self {
        ExecutionFailure::TaskFailed {
            task_id: err.task_id,
            retry_count: err.retry_count,
            attempts_exhausted: err.attempts_exhausted,
            message: err.message,
        }
    }
}

/// Errors surfaced by the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),

    #[error("workflow '{0}' is already registered")]
    DuplicateWorkflow(String),

    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),

    /// No task is ready but some are not terminal.
    #[error("workflow stuck: no ready tasks while [{}] remain", .pending.join(", "))]
    WorkflowStuck { pending: Vec<String> },

    #[error(transparent)]
    TaskExecution(#[from] TaskExecutionError),

    #[error("execution cancelled")]
    Cancelled,

    /// A worker reported on a task the execution does not contain.
    #[error("task '{0}' is not part of this execution")]
    UnknownTask(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("execution {execution_id} cannot be resumed: {reason}")]
    NotResumable { execution_id: Uuid, reason: String },

    #[error("execution {execution_id} did not finish (state: {state})")]
    Incomplete {
        execution_id: Uuid,
        state: ExecutionState,
    },

    #[error("execution store error: {0}")]
    Store(#[from] RepositoryError),
}

impl From<ExecutionFailure> for EngineError {
    fn from(failure: ExecutionFailure) -> Self {
        match failure {
            ExecutionFailure::TaskFailed {
                task_id,
                retry_count,
                attempts_exhausted,
                message,
            } => EngineError::TaskExecution(TaskExecutionError {
                task_id,
                retry_count,
                attempts_exhausted,
                message,
            }),
            ExecutionFailure::Stuck { pending } => EngineError::WorkflowStuck { pending },
            ExecutionFailure::Cancelled => EngineError::Cancelled,
        }
    }
}

/// Turn a finished execution into `Err` when it did not complete.
///
/// `execute` reports task-level failures inside the returned execution; this
/// is for callers that prefer `?` propagation of the root cause.
pub fn into_result(
    execution: conductor_types::execution::WorkflowExecution,
) -> Result<conductor_types::execution::WorkflowExecution, EngineError> {
    match (&execution.state, &execution.error) {
        (ExecutionState::Completed, _) => Ok(execution),
        (_, Some(failure)) => Err(failure.clone().into()),
        (state, None) => Err(EngineError::Incomplete {
            execution_id: execution.execution_id,
            state: *state,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::execution::WorkflowExecution;

    #[test]
    fn stuck_error_lists_pending_tasks() {
        let err = EngineError::WorkflowStuck {
            pending: vec!["b".into(), "c".into()],
        };
        assert_eq!(
            err.to_string(),
            "workflow stuck: no ready tasks while [b, c] remain"
        );
    }

    #[test]
    fn task_error_converts_to_failure_and_back() {
        let err = TaskExecutionError {
            task_id: "extract".into(),
            retry_count: 3,
            attempts_exhausted: true,
            message: "boom".into(),
        };
        let failure: ExecutionFailure = err.clone().into();
        match EngineError::from(failure) {
            EngineError::TaskExecution(back) => assert_eq!(back, err),
            other => panic!("expected TaskExecution, got {other:?}"),
        }
    }

    #[test]
    fn into_result_surfaces_root_cause() {
        let mut exec = WorkflowExecution::new("wf");
        exec.state = ExecutionState::Failed;
        exec.error = Some(ExecutionFailure::Stuck {
            pending: vec!["d".into()],
        });
        assert!(matches!(
            into_result(exec),
            Err(EngineError::WorkflowStuck { .. })
        ));

        let mut ok = WorkflowExecution::new("wf");
        ok.state = ExecutionState::Completed;
        assert!(into_result(ok).is_ok());
    }
}
