//! Audit trail entries recorded for every execution state transition.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of transition an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    WorkflowResumed,
    TaskStarted,
    TaskRetry,
    TaskCompleted,
    TaskFailed,
    TaskSkipped,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::WorkflowStarted => "WORKFLOW_STARTED",
            AuditEvent::WorkflowCompleted => "WORKFLOW_COMPLETED",
            AuditEvent::WorkflowFailed => "WORKFLOW_FAILED",
            AuditEvent::WorkflowCancelled => "WORKFLOW_CANCELLED",
            AuditEvent::WorkflowResumed => "WORKFLOW_RESUMED",
            AuditEvent::TaskStarted => "TASK_STARTED",
            AuditEvent::TaskRetry => "TASK_RETRY",
            AuditEvent::TaskCompleted => "TASK_COMPLETED",
            AuditEvent::TaskFailed => "TASK_FAILED",
            AuditEvent::TaskSkipped => "TASK_SKIPPED",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WORKFLOW_STARTED" => Ok(AuditEvent::WorkflowStarted),
            "WORKFLOW_COMPLETED" => Ok(AuditEvent::WorkflowCompleted),
            "WORKFLOW_FAILED" => Ok(AuditEvent::WorkflowFailed),
            "WORKFLOW_CANCELLED" => Ok(AuditEvent::WorkflowCancelled),
            "WORKFLOW_RESUMED" => Ok(AuditEvent::WorkflowResumed),
            "TASK_STARTED" => Ok(AuditEvent::TaskStarted),
            "TASK_RETRY" => Ok(AuditEvent::TaskRetry),
            "TASK_COMPLETED" => Ok(AuditEvent::TaskCompleted),
            "TASK_FAILED" => Ok(AuditEvent::TaskFailed),
            "TASK_SKIPPED" => Ok(AuditEvent::TaskSkipped),
            other => Err(format!("invalid audit event: '{other}'")),
        }
    }
}

/// A single immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub execution_id: Uuid,
    pub event: AuditEvent,
    /// Task the entry refers to; `None` for workflow-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Event-specific payload (durations, attempt counts, error messages).
    #[serde(default)]
    pub details: Value,
}
