//! Workflow engine: registration, ready-round scheduling, retries, and
//! durable snapshots.
//!
//! # Execution flow
//!
//! 1. `register_workflow` validates the DAG once and stores the task set.
//! 2. `execute` creates a `WorkflowExecution` with PENDING task runs, seeds
//!    the context, records `WORKFLOW_STARTED` and persists the snapshot.
//! 3. Each round: compute the ready set, spawn one worker per ready task
//!    into a `JoinSet` (at most `max_parallelism` in flight), and apply the
//!    `TaskEvent`s the workers send back over an `mpsc` channel.
//! 4. The execution ends COMPLETED, FAILED or CANCELLED and is persisted.
//!
//! Workers never touch the execution. They own the attempt loop (action
//! call, timeout, backoff sleep) and report what happened; the scheduler
//! applies every state change, audit entry, and snapshot in arrival order.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use conductor_types::audit::AuditEvent;
use conductor_types::config::{BackoffConfig, EngineConfig, FailurePolicy};
use conductor_types::execution::{
    ExecutionFailure, ExecutionState, ExecutionStatus, TaskRun, TaskState, WorkflowExecution,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::execution::ExecutionStore;

use super::audit::AuditLog;
use super::context::ExecutionContext;
use super::dag::{topological_order, transitive_dependents, validate_dag};
use super::error::{EngineError, TaskExecutionError};
use super::retry::RetryHandler;
use super::scheduler::{Round, next_round};
use super::task::{ActionError, TaskDefinition};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// An immutable, validated task set.
#[derive(Debug)]
pub struct RegisteredWorkflow {
    pub id: String,
    tasks: BTreeMap<String, TaskDefinition>,
    /// Topological order, ties broken by declaration order.
    order: Vec<String>,
}

impl RegisteredWorkflow {
    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.get(id)
    }

    /// Task ids in dispatch order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Fresh PENDING runs for every task.
    fn fresh_runs(&self) -> BTreeMap<String, TaskRun> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(|t| (t.id.clone(), TaskRun::new(t.id.clone(), t.dependencies.clone())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Worker protocol
// ---------------------------------------------------------------------------

/// What a worker reports back to the scheduler.
#[derive(Debug)]
enum TaskEvent {
    /// Attempt `attempt` (zero-based) is about to invoke the action.
    Started { task_id: String, attempt: u32 },
    Succeeded {
        task_id: String,
        attempt: u32,
        value: Value,
    },
    /// `retry_in` is set when another attempt follows after that delay.
    AttemptFailed {
        task_id: String,
        attempt: u32,
        error: String,
        retry_in: Option<Duration>,
    },
    /// The round was halted between attempts: by cancellation, or by a
    /// fail-fast failure elsewhere.
    Abandoned { task_id: String },
}

/// Everything a worker needs, owned so the spawned future is `'static`.
struct Worker {
    task: TaskDefinition,
    ctx: ExecutionContext,
    backoff: BackoffConfig,
    enforce_timeouts: bool,
    /// Tripped by cancellation or by a fail-fast failure in the same round.
    halt: CancellationToken,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl Worker {
    async fn run(self) {
        let task_id = self.task.id.clone();
        let attempts = RetryHandler::total_attempts(self.task.max_retries);

        for attempt in 0..attempts {
            if self.halt.is_cancelled() {
                // Nothing was reported yet for a first attempt; the run stays PENDING.
                if attempt > 0 {
                    let _ = self.events.send(TaskEvent::Abandoned { task_id });
                }
                return;
            }
            if self
                .events
                .send(TaskEvent::Started {
                    task_id: task_id.clone(),
                    attempt,
                })
                .is_err()
            {
                return;
            }

            let (event, retry_in) = match self.invoke().await {
                Ok(value) => (
                    TaskEvent::Succeeded {
                        task_id: task_id.clone(),
                        attempt,
                        value,
                    },
                    None,
                ),
                Err(err) => {
                    let retry_in = RetryHandler::should_retry(self.task.max_retries, attempt)
                        .then(|| RetryHandler::backoff(&self.backoff, attempt));
                    let event = TaskEvent::AttemptFailed {
                        task_id: task_id.clone(),
                        attempt,
                        error: err.message().to_string(),
                        retry_in,
                    };
                    (event, retry_in)
                }
            };

            if self.events.send(event).is_err() {
                return;
            }
            let Some(delay) = retry_in else {
                return;
            };

            tokio::select! {
                _ = self.halt.cancelled() => {
                    let _ = self.events.send(TaskEvent::Abandoned { task_id });
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt: panics and timeouts become attempt errors.
    async fn invoke(&self) -> Result<Value, ActionError> {
        let fut = AssertUnwindSafe(self.task.action.run(self.ctx.clone())).catch_unwind();

        let caught = match self.task.timeout.filter(|_| self.enforce_timeouts) {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Err(ActionError::new(format!(
                        "timed out after {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => fut.await,
        };

        caught.unwrap_or_else(|panic| Err(ActionError::new(panic_message(&*panic))))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("action panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("action panicked: {s}")
    } else {
        "action panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Registers workflows and drives their executions.
///
/// Generic over `S: ExecutionStore` for storage flexibility. One engine can
/// run many executions concurrently; they share only the registry.
pub struct WorkflowEngine<S: ExecutionStore> {
    store: S,
    config: EngineConfig,
    workflows: DashMap<String, Arc<RegisteredWorkflow>>,
    /// Cancellation tokens keyed by execution id, live while an execution runs.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<S: ExecutionStore> WorkflowEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            workflows: DashMap::new(),
            cancellation_tokens: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Validate `tasks` and store them under `workflow_id`.
    pub fn register_workflow(
        &self,
        workflow_id: impl Into<String>,
        tasks: Vec<TaskDefinition>,
    ) -> Result<(), EngineError> {
        let workflow_id = workflow_id.into();
        validate_dag(&tasks)?;
        let order: Vec<String> = topological_order(&tasks)?
            .into_iter()
            .map(str::to_owned)
            .collect();

        match self.workflows.entry(workflow_id.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateWorkflow(workflow_id)),
            Entry::Vacant(slot) => {
                tracing::info!(
                    workflow_id = workflow_id.as_str(),
                    tasks = tasks.len(),
                    "workflow registered"
                );
                slot.insert(Arc::new(RegisteredWorkflow {
                    id: workflow_id,
                    tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
                    order,
                }));
                Ok(())
            }
        }
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.workflows.get(workflow_id).map(|w| Arc::clone(w.value()))
    }

    /// Registered workflow ids, sorted.
    pub fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.workflows.iter().map(|w| w.key().clone()).collect();
        ids.sort();
        ids
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run `workflow_id` to a terminal state.
    ///
    /// Task failures do not produce `Err`: the returned execution is FAILED
    /// and carries the root cause in `error`. `Err` means structural misuse
    /// or a storage fault.
    pub async fn execute(
        &self,
        workflow_id: &str,
        initial_context: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<WorkflowExecution, EngineError> {
        let workflow = self
            .workflow(workflow_id)
            .ok_or_else(|| EngineError::UnknownWorkflow(workflow_id.to_string()))?;

        let mut exec = WorkflowExecution::new(workflow_id);
        exec.task_runs = workflow.fresh_runs();
        exec.context = initial_context.into_iter().collect();
        exec.transition(ExecutionState::Running)?;
        exec.start_time = Some(Utc::now());
        exec.record(
            AuditEvent::WorkflowStarted,
            None,
            json!({ "tasks": exec.task_runs.len() }),
        );

        tracing::info!(
            execution_id = %exec.execution_id,
            workflow_id,
            "starting workflow execution"
        );

        self.store.save(&exec).await?;
        self.drive(&workflow, exec).await
    }

    /// Cancel a live execution. Returns `false` if it is not running here.
    pub fn cancel(&self, execution_id: &Uuid) -> bool {
        match self.cancellation_tokens.get(execution_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(execution_id = %execution_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every execution live on this engine. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for token in self.cancellation_tokens.iter() {
            token.cancel();
            count += 1;
        }
        if count > 0 {
            tracing::info!(count, "cancellation requested for all live executions");
        }
        count
    }

    /// Status of a live or persisted execution.
    pub async fn status(&self, execution_id: &Uuid) -> Result<ExecutionStatus, EngineError> {
        Ok(self.load(execution_id).await?.status())
    }

    /// Last persisted snapshot of an execution.
    pub async fn load(&self, execution_id: &Uuid) -> Result<WorkflowExecution, EngineError> {
        self.store
            .load(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(*execution_id))
    }

    /// Persisted executions left RUNNING by a previous process.
    ///
    /// Only executions live on this engine are excluded. An execution still
    /// being driven by another process looks the same as a crashed one, so
    /// resuming these assumes a single process owns the store.
    pub async fn recover_interrupted(&self) -> Result<Vec<WorkflowExecution>, EngineError> {
        let running = self.store.list_by_state(ExecutionState::Running).await?;
        Ok(running
            .into_iter()
            .filter(|e| !self.cancellation_tokens.contains_key(&e.execution_id))
            .collect())
    }

    /// Continue a persisted RUNNING execution with the registered actions.
    ///
    /// Completed tasks keep their results; interrupted attempts start over,
    /// so a task may run more than once across a crash.
    pub async fn resume(&self, execution_id: &Uuid) -> Result<WorkflowExecution, EngineError> {
        let mut exec = self.load(execution_id).await?;
        let not_resumable = |reason: String| EngineError::NotResumable {
            execution_id: *execution_id,
            reason,
        };

        if exec.state != ExecutionState::Running {
            return Err(not_resumable(format!("execution is {}", exec.state)));
        }
        if self.cancellation_tokens.contains_key(execution_id) {
            return Err(not_resumable("execution is still running".to_string()));
        }
        let workflow = self
            .workflow(&exec.workflow_id)
            .ok_or_else(|| EngineError::UnknownWorkflow(exec.workflow_id.clone()))?;
        let same_tasks = exec.task_runs.len() == workflow.tasks.len()
            && exec.task_runs.keys().all(|id| workflow.tasks.contains_key(id));
        if !same_tasks {
            return Err(not_resumable(
                "task set differs from the registered workflow".to_string(),
            ));
        }

        // Interrupted attempts go back to PENDING. This is a recovery reset,
        // not a lifecycle transition.
        let mut reset = Vec::new();
        for run in exec.task_runs.values_mut() {
            if matches!(run.state, TaskState::Running | TaskState::Retrying) {
                run.state = TaskState::Pending;
                run.end_time = None;
                reset.push(run.task_id.clone());
            }
        }
        exec.record(
            AuditEvent::WorkflowResumed,
            None,
            json!({ "reset_tasks": reset }),
        );

        tracing::info!(
            execution_id = %exec.execution_id,
            workflow_id = exec.workflow_id.as_str(),
            reset = reset.len(),
            "resuming workflow execution"
        );

        self.store.save(&exec).await?;
        self.drive(&workflow, exec).await
    }

    // -----------------------------------------------------------------------
    // Scheduler loop
    // -----------------------------------------------------------------------

    async fn drive(
        &self,
        workflow: &RegisteredWorkflow,
        exec: WorkflowExecution,
    ) -> Result<WorkflowExecution, EngineError> {
        let execution_id = exec.execution_id;
        let cancel = CancellationToken::new();
        self.cancellation_tokens.insert(execution_id, cancel.clone());

        let result = self.run_to_end(workflow, exec, cancel).await;

        self.cancellation_tokens.remove(&execution_id);
        result
    }

    async fn run_to_end(
        &self,
        workflow: &RegisteredWorkflow,
        mut exec: WorkflowExecution,
        cancel: CancellationToken,
    ) -> Result<WorkflowExecution, EngineError> {
        let ctx = ExecutionContext::new(
            exec.execution_id,
            std::mem::take(&mut exec.context),
            cancel.clone(),
        );
        let mut first_failure = earliest_failure(&exec);
        let started = Instant::now();

        let outcome = loop {
            if cancel.is_cancelled() {
                break Outcome::Cancelled;
            }
            if first_failure.is_some() && self.config.failure_policy == FailurePolicy::FailFast {
                break Outcome::Failed;
            }

            let ready = match next_round(&exec.task_runs, workflow.order()) {
                Ok(Round::Ready(ready)) => ready,
                Ok(Round::Finished) => {
                    break if first_failure.is_some() {
                        Outcome::Failed
                    } else {
                        Outcome::Completed
                    };
                }
                Err(EngineError::WorkflowStuck { pending }) => break Outcome::Stuck(pending),
                Err(e) => return Err(e),
            };

            self.run_round(workflow, &mut exec, &ctx, &cancel, ready, &mut first_failure)
                .await?;
        };

        exec.context = ctx.snapshot();
        self.finish(exec, outcome, first_failure, started).await
    }

    /// Dispatch one ready round and apply worker events until it drains.
    async fn run_round(
        &self,
        workflow: &RegisteredWorkflow,
        exec: &mut WorkflowExecution,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
        ready: Vec<String>,
        first_failure: &mut Option<TaskExecutionError>,
    ) -> Result<(), EngineError> {
        let limit = self.config.max_parallelism.max(1);
        let halt = cancel.child_token();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        let mut queue = ready.into_iter();
        let mut in_flight = 0usize;

        loop {
            // Under fail-fast a permanent failure halts the round: nothing new
            // is dispatched and retrying siblings give up at their next attempt.
            if first_failure.is_some() && self.config.failure_policy == FailurePolicy::FailFast {
                halt.cancel();
            }
            while in_flight < limit && !halt.is_cancelled() {
                let Some(task_id) = queue.next() else { break };
                // An earlier failure in this round may have skipped it.
                if exec.task_runs.get(&task_id).map(|r| r.state) != Some(TaskState::Pending) {
                    continue;
                }
                let Some(task) = workflow.task(&task_id) else { continue };
                workers.spawn(
                    Worker {
                        task: task.clone(),
                        ctx: ctx.clone(),
                        backoff: self.config.backoff,
                        enforce_timeouts: self.config.enforce_timeouts,
                        halt: halt.clone(),
                        events: tx.clone(),
                    }
                    .run(),
                );
                in_flight += 1;
            }

            if in_flight == 0 {
                return Ok(());
            }

            tokio::select! {
                Some(event) = rx.recv() => {
                    self.apply(workflow, exec, ctx, event, first_failure).await?;
                }
                Some(joined) = workers.join_next() => {
                    in_flight -= 1;
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "task worker aborted");
                    }
                    // Drain whatever that worker sent before exiting.
                    while let Ok(event) = rx.try_recv() {
                        self.apply(workflow, exec, ctx, event, first_failure).await?;
                    }
                }
            }
        }
    }

    /// Apply one worker event to the execution. The only place task runs change.
    async fn apply(
        &self,
        workflow: &RegisteredWorkflow,
        exec: &mut WorkflowExecution,
        ctx: &ExecutionContext,
        event: TaskEvent,
        first_failure: &mut Option<TaskExecutionError>,
    ) -> Result<(), EngineError> {
        let execution_id = exec.execution_id;
        let mut terminal = false;

        match event {
            TaskEvent::Started { task_id, attempt } => {
                let run = task_run(exec, &task_id)?;
                run.transition(TaskState::Running)?;
                run.start_time = Some(Utc::now());
                run.end_time = None;
                run.attempts += 1;
                tracing::debug!(
                    execution_id = %execution_id,
                    task_id = task_id.as_str(),
                    attempt,
                    "task started"
                );
                exec.record(
                    AuditEvent::TaskStarted,
                    Some(task_id.as_str()),
                    json!({ "attempt": attempt + 1 }),
                );
            }
            TaskEvent::Succeeded {
                task_id,
                attempt,
                value,
            } => {
                let run = task_run(exec, &task_id)?;
                run.transition(TaskState::Completed)?;
                run.end_time = Some(Utc::now());
                run.result = Some(value.clone());
                let duration_ms = run.duration_ms().unwrap_or(0);
                ctx.insert(task_id.clone(), value);
                tracing::debug!(
                    execution_id = %execution_id,
                    task_id = task_id.as_str(),
                    duration_ms,
                    "task completed"
                );
                exec.record(
                    AuditEvent::TaskCompleted,
                    Some(task_id.as_str()),
                    json!({ "duration_ms": duration_ms, "attempts": attempt + 1 }),
                );
                terminal = true;
            }
            TaskEvent::AttemptFailed {
                task_id,
                attempt,
                error,
                retry_in: Some(delay),
            } => {
                let run = task_run(exec, &task_id)?;
                run.transition(TaskState::Retrying)?;
                run.error = Some(error.clone());
                run.retry_count += 1;
                let retry_count = run.retry_count;
                tracing::warn!(
                    execution_id = %execution_id,
                    task_id = task_id.as_str(),
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = error.as_str(),
                    "task attempt failed, retrying"
                );
                exec.record(
                    AuditEvent::TaskRetry,
                    Some(task_id.as_str()),
                    json!({
                        "attempt": attempt + 1,
                        "retry_count": retry_count,
                        "backoff_ms": delay.as_millis() as u64,
                        "error": error,
                    }),
                );
            }
            TaskEvent::AttemptFailed {
                task_id,
                attempt,
                error,
                retry_in: None,
            } => {
                let run = task_run(exec, &task_id)?;
                run.transition(TaskState::Failed)?;
                run.error = Some(error.clone());
                run.retry_count += 1;
                run.end_time = Some(Utc::now());
                let failure = TaskExecutionError {
                    task_id: task_id.clone(),
                    retry_count: run.retry_count,
                    attempts_exhausted: true,
                    message: error,
                };
                tracing::warn!(
                    execution_id = %execution_id,
                    task_id = task_id.as_str(),
                    attempts = attempt + 1,
                    error = failure.message.as_str(),
                    "task failed"
                );
                exec.record(
                    AuditEvent::TaskFailed,
                    Some(task_id.as_str()),
                    json!({ "attempts": attempt + 1, "error": failure.message }),
                );
                self.on_task_failed(workflow, exec, failure, first_failure);
                terminal = true;
            }
            TaskEvent::Abandoned { task_id } => {
                let reason = if ctx.is_cancelled() { "cancelled" } else { "fail_fast" };
                let run = task_run(exec, &task_id)?;
                run.transition(TaskState::Failed)?;
                run.end_time = Some(Utc::now());
                let failure = TaskExecutionError {
                    task_id: task_id.clone(),
                    retry_count: run.retry_count,
                    attempts_exhausted: false,
                    message: run.error.clone().unwrap_or_else(|| reason.to_string()),
                };
                let attempts = run.attempts;
                tracing::info!(
                    execution_id = %execution_id,
                    task_id = task_id.as_str(),
                    reason,
                    "retry abandoned"
                );
                exec.record(
                    AuditEvent::TaskFailed,
                    Some(task_id.as_str()),
                    json!({
                        "attempts": attempts,
                        "error": failure.message,
                        "abandoned": true,
                        "reason": reason,
                    }),
                );
                // Dependents are left PENDING: the task never failed on its own.
                if first_failure.is_none() {
                    *first_failure = Some(failure);
                }
                terminal = true;
            }
        }

        if terminal || self.config.persist_every_transition {
            exec.context = ctx.snapshot();
            self.store.save(exec).await?;
        }
        Ok(())
    }

    /// Record the first permanent failure and apply the failure policy.
    fn on_task_failed(
        &self,
        workflow: &RegisteredWorkflow,
        exec: &mut WorkflowExecution,
        failure: TaskExecutionError,
        first_failure: &mut Option<TaskExecutionError>,
    ) {
        if self.config.failure_policy == FailurePolicy::SkipDependents {
            let runs: Vec<TaskRun> = exec.task_runs.values().cloned().collect();
            let dependents = transitive_dependents(&failure.task_id, &runs);
            for id in workflow.order() {
                if !dependents.contains(id.as_str()) {
                    continue;
                }
                let Some(run) = exec.task_runs.get_mut(id) else { continue };
                if run.state != TaskState::Pending || run.transition(TaskState::Skipped).is_err() {
                    continue;
                }
                tracing::debug!(
                    execution_id = %exec.execution_id,
                    task_id = id.as_str(),
                    failed = failure.task_id.as_str(),
                    "task skipped"
                );
                exec.record(
                    AuditEvent::TaskSkipped,
                    Some(id.as_str()),
                    json!({ "failed_dependency": failure.task_id }),
                );
            }
        }

        if first_failure.is_none() {
            *first_failure = Some(failure);
        }
    }

    /// Move the execution to its terminal state, audit it, persist it.
    async fn finish(
        &self,
        mut exec: WorkflowExecution,
        outcome: Outcome,
        first_failure: Option<TaskExecutionError>,
        started: Instant,
    ) -> Result<WorkflowExecution, EngineError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let execution_id = exec.execution_id;

        match outcome {
            Outcome::Completed => {
                exec.transition(ExecutionState::Completed)?;
                exec.end_time = Some(Utc::now());
                exec.record(
                    AuditEvent::WorkflowCompleted,
                    None,
                    json!({ "duration_ms": duration_ms }),
                );
                tracing::info!(execution_id = %execution_id, duration_ms, "workflow completed");
            }
            Outcome::Cancelled => {
                exec.transition(ExecutionState::Cancelled)?;
                exec.end_time = Some(Utc::now());
                exec.error = Some(ExecutionFailure::Cancelled);
                exec.record(
                    AuditEvent::WorkflowCancelled,
                    None,
                    json!({ "duration_ms": duration_ms }),
                );
                tracing::info!(execution_id = %execution_id, "workflow cancelled");
            }
            Outcome::Failed | Outcome::Stuck(_) => {
                let failure = match (outcome, first_failure) {
                    (Outcome::Stuck(pending), _) => ExecutionFailure::Stuck { pending },
                    (_, Some(err)) => err.into(),
                    // Failed is only chosen once a task failure was recorded.
                    (_, None) => ExecutionFailure::Stuck { pending: vec![] },
                };
                exec.transition(ExecutionState::Failed)?;
                exec.end_time = Some(Utc::now());
                exec.record(
                    AuditEvent::WorkflowFailed,
                    None,
                    json!({ "duration_ms": duration_ms, "error": failure }),
                );
                tracing::warn!(execution_id = %execution_id, error = %failure, "workflow failed");
                exec.error = Some(failure);
            }
        }

        self.store.save(&exec).await?;
        Ok(exec)
    }
}

/// How the scheduler loop ended.
enum Outcome {
    Completed,
    Failed,
    Stuck(Vec<String>),
    Cancelled,
}

/// The root cause a resumed execution already carries: the FAILED run whose
/// `TASK_FAILED` entry came first, or any FAILED run if the log has none.
fn earliest_failure(exec: &WorkflowExecution) -> Option<TaskExecutionError> {
    let logged = exec
        .audit_log
        .iter()
        .filter(|e| e.event == AuditEvent::TaskFailed)
        .find_map(|e| {
            let run = exec.task_runs.get(e.task_id.as_deref()?)?;
            let abandoned = e.details.get("abandoned") == Some(&Value::Bool(true));
            (run.state == TaskState::Failed).then_some((run, !abandoned))
        });
    let (run, attempts_exhausted) = logged.or_else(|| {
        exec.task_runs
            .values()
            .find(|r| r.state == TaskState::Failed)
            .map(|r| (r, true))
    })?;

    Some(TaskExecutionError {
        task_id: run.task_id.clone(),
        retry_count: run.retry_count,
        attempts_exhausted,
        message: run.error.clone().unwrap_or_default(),
    })
}

fn task_run<'a>(
    exec: &'a mut WorkflowExecution,
    task_id: &str,
) -> Result<&'a mut TaskRun, EngineError> {
    exec.task_runs
        .get_mut(task_id)
        .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))
}
