//! Execution state types: task and workflow state machines, per-run task
//! records, and the persisted `WorkflowExecution` snapshot.
//!
//! States are closed enums with explicit transition tables so that an illegal
//! move (e.g. `Completed -> Running`) is rejected at the point it is attempted
//! instead of producing a silently inconsistent snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::error::TransitionError;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Lifecycle of a single task within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    Skipped,
}

impl TaskState {
    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Retrying)
                | (Retrying, Running)
                | (Retrying, Failed)
        )
    }

    /// No further transitions will happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Skipped)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Retrying => write!(f, "retrying"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Skipped => write!(f, "skipped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow execution state machine
// ---------------------------------------------------------------------------

/// Lifecycle of a triggered workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "pending"),
            ExecutionState::Running => write!(f, "running"),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Failed => write!(f, "failed"),
            ExecutionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ExecutionState::Pending),
            "running" => Ok(ExecutionState::Running),
            "completed" => Ok(ExecutionState::Completed),
            "failed" => Ok(ExecutionState::Failed),
            "cancelled" => Ok(ExecutionState::Cancelled),
            other => Err(format!("invalid execution state: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskRun
// ---------------------------------------------------------------------------

/// Mutable per-execution record for one task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub state: TaskState,
    /// Dependencies copied from the definition so a loaded snapshot can be
    /// inspected without the workflow registry.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Message of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start of the most recent attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Number of attempts started so far.
    pub attempts: u32,
}

impl TaskRun {
    /// A fresh PENDING run for the given task.
    pub fn new(task_id: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            dependencies,
            result: None,
            error: None,
            start_time: None,
            end_time: None,
            retry_count: 0,
            attempts: 0,
        }
    }

    /// Move to `next`, rejecting transitions the table forbids.
    pub fn transition(&mut self, next: TaskState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Task {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Wall-clock duration of the last attempt, if it has finished.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Failure root cause
// ---------------------------------------------------------------------------

/// Why an execution ended in FAILED or CANCELLED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    /// A task exhausted its retry budget.
    TaskFailed {
        task_id: String,
        retry_count: u32,
        attempts_exhausted: bool,
        message: String,
    },
    /// No task was ready while some remained non-terminal.
    Stuck { pending: Vec<String> },
    /// The execution was cancelled before finishing.
    Cancelled,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFailure::TaskFailed {
                task_id,
                retry_count,
                message,
                ..
            } => write!(
                f,
                "task '{task_id}' failed after {retry_count} failed attempt(s): {message}"
            ),
            ExecutionFailure::Stuck { pending } => {
                write!(f, "workflow stuck with unreachable tasks: {}", pending.join(", "))
            }
            ExecutionFailure::Cancelled => write!(f, "execution cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// One triggered run of a registered workflow. Also the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub state: ExecutionState,
    /// Shared context map, keyed by name. Task results live under task ids.
    pub context: BTreeMap<String, Value>,
    pub task_runs: BTreeMap<String, TaskRun>,
    pub audit_log: Vec<AuditEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
}

impl WorkflowExecution {
    /// Create a PENDING execution with no task runs.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            workflow_id: workflow_id.into(),
            state: ExecutionState::Pending,
            context: BTreeMap::new(),
            task_runs: BTreeMap::new(),
            audit_log: Vec::new(),
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn transition(&mut self, next: ExecutionState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Execution {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Summarize this execution for status queries.
    pub fn status(&self) -> ExecutionStatus {
        let mut counts = TaskCounts {
            total: self.task_runs.len(),
            ..TaskCounts::default()
        };
        for run in self.task_runs.values() {
            match run.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running | TaskState::Retrying => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Skipped => counts.skipped += 1,
            }
        }

        ExecutionStatus {
            execution_id: self.execution_id,
            workflow_id: self.workflow_id.clone(),
            state: self.state,
            tasks: counts,
            error: self.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// Per-state task counts for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub running: usize,
    pub skipped: usize,
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub state: ExecutionState,
    pub tasks: TaskCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
}
