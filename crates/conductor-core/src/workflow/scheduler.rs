//! Ready-set computation for the engine's dispatch loop.
//!
//! Pure functions over a snapshot of task runs. The engine calls
//! [`next_round`] after every round; keeping it free of I/O makes stuck
//! detection and ordering testable without spawning anything.

use std::collections::BTreeMap;

use conductor_types::execution::{TaskRun, TaskState};

use super::error::EngineError;

/// What the engine should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Round {
    /// Dispatch these tasks, in this order.
    Ready(Vec<String>),
    /// Every task is terminal.
    Finished,
}

/// A PENDING task whose dependencies have all COMPLETED.
pub fn is_ready(run: &TaskRun, runs: &BTreeMap<String, TaskRun>) -> bool {
    run.state == TaskState::Pending
        && run.dependencies.iter().all(|dep| {
            runs.get(dep)
                .is_some_and(|d| d.state == TaskState::Completed)
        })
}

/// Compute the next ready round.
///
/// `order` is the workflow's declaration order; ready tasks are returned in
/// that order so sequential runs are deterministic. Fails with
/// [`EngineError::WorkflowStuck`] when nothing is ready yet some tasks are
/// still non-terminal.
pub fn next_round(
    runs: &BTreeMap<String, TaskRun>,
    order: &[String],
) -> Result<Round, EngineError> {
    let ready: Vec<String> = order
        .iter()
        .filter_map(|id| runs.get(id))
        .filter(|run| is_ready(run, runs))
        .map(|run| run.task_id.clone())
        .collect();

    if !ready.is_empty() {
        return Ok(Round::Ready(ready));
    }

    let pending = non_terminal(runs, order);
    if pending.is_empty() {
        Ok(Round::Finished)
    } else {
        Err(EngineError::WorkflowStuck { pending })
    }
}

/// Ids of tasks that have not reached a terminal state, in declaration order.
pub fn non_terminal(runs: &BTreeMap<String, TaskRun>, order: &[String]) -> Vec<String> {
    order
        .iter()
        .filter(|id| runs.get(*id).is_some_and(|run| !run.state.is_terminal()))
        .cloned()
        .collect()
}
