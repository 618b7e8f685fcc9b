use thiserror::Error;

use crate::execution::{ExecutionState, TaskState};

/// Errors from repository operations (used by trait definitions in conductor-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// An attempted state change that the transition table forbids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal task transition {from} -> {to}")]
    Task { from: TaskState, to: TaskState },

    #[error("illegal execution transition {from} -> {to}")]
    Execution {
        from: ExecutionState,
        to: ExecutionState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError::Task {
            from: TaskState::Completed,
            to: TaskState::Running,
        };
        assert_eq!(err.to_string(), "illegal task transition completed -> running");
    }
}
