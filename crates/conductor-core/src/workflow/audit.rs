//! Append-only audit trail helpers for a `WorkflowExecution`.
//!
//! Entries are only ever pushed; nothing here mutates or removes an existing
//! entry. Timestamps are clamped so they never go backwards, even if the wall
//! clock steps back between two records.

use chrono::Utc;
use conductor_types::audit::{AuditEntry, AuditEvent};
use conductor_types::execution::WorkflowExecution;
use serde_json::Value;

/// Audit recording for an execution snapshot.
pub trait AuditLog {
    /// Append one entry stamped with the current time.
    fn record(&mut self, event: AuditEvent, task_id: Option<&str>, details: Value);

    /// Entries about `task_id`, in recorded order.
    fn events_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a;
}

impl AuditLog for WorkflowExecution {
    fn record(&mut self, event: AuditEvent, task_id: Option<&str>, details: Value) {
        let mut timestamp = Utc::now();
        if let Some(last) = self.audit_log.last() {
            timestamp = timestamp.max(last.timestamp);
        }

        tracing::debug!(
            execution_id = %self.execution_id,
            event = %event,
            task_id = task_id.unwrap_or("-"),
            "audit"
        );

        self.audit_log.push(AuditEntry {
            timestamp,
            execution_id: self.execution_id,
            event,
            task_id: task_id.map(str::to_owned),
            details,
        });
    }

    fn events_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        self.audit_log
            .iter()
            .filter(move |entry| entry.task_id.as_deref() == Some(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_appends_in_order() {
        let mut exec = WorkflowExecution::new("wf");
        exec.record(AuditEvent::WorkflowStarted, None, json!({}));
        exec.record(AuditEvent::TaskStarted, Some("a"), json!({ "attempt": 1 }));
        exec.record(AuditEvent::TaskCompleted, Some("a"), json!({ "duration_ms": 3 }));

        let events: Vec<_> = exec.audit_log.iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                AuditEvent::WorkflowStarted,
                AuditEvent::TaskStarted,
                AuditEvent::TaskCompleted
            ]
        );
        assert!(exec.audit_log.iter().all(|e| e.execution_id == exec.execution_id));
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut exec = WorkflowExecution::new("wf");
        exec.record(AuditEvent::WorkflowStarted, None, json!({}));
        // Simulate a clock that ran ahead on the previous entry.
        let future = Utc::now() + chrono::Duration::seconds(60);
        exec.audit_log[0].timestamp = future;
        exec.record(AuditEvent::TaskStarted, Some("a"), json!({}));
        assert_eq!(exec.audit_log[1].timestamp, future);
    }

    #[test]
    fn events_for_filters_by_task() {
        let mut exec = WorkflowExecution::new("wf");
        exec.record(AuditEvent::WorkflowStarted, None, json!({}));
        exec.record(AuditEvent::TaskStarted, Some("a"), json!({}));
        exec.record(AuditEvent::TaskStarted, Some("b"), json!({}));
        exec.record(AuditEvent::TaskRetry, Some("a"), json!({}));

        let a: Vec<_> = exec.events_for("a").map(|e| e.event).collect();
        assert_eq!(a, vec![AuditEvent::TaskStarted, AuditEvent::TaskRetry]);
        assert_eq!(exec.events_for("zzz").count(), 0);
    }
}
