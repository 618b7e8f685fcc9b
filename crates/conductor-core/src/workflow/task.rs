//! Task definitions and the action contract.
//!
//! A task's body is opaque to the engine: it is any [`TaskAction`] that takes
//! the execution context and resolves to a JSON value or an [`ActionError`].
//! Closures adapt through [`action_fn`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::context::ExecutionContext;

/// Future returned by a task action.
pub type ActionFuture = BoxFuture<'static, Result<Value, ActionError>>;

/// The unit of work a task performs.
///
/// Actions report their outcome only through the returned value; they must
/// not depend on engine internals. The engine stores a successful value in
/// the context under the task's id.
pub trait TaskAction: Send + Sync {
    fn run(&self, ctx: ExecutionContext) -> ActionFuture;
}

/// Error raised by a task action, carrying a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Adapter turning an async closure into a [`TaskAction`].
pub struct FnAction<F>(F);

impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    fn run(&self, ctx: ExecutionContext) -> ActionFuture {
        Box::pin((self.0)(ctx))
    }
}

/// Wrap an async closure as a shareable action.
///
/// ```
/// use conductor_core::workflow::task::action_fn;
/// use serde_json::json;
///
/// let action = action_fn(|ctx| async move {
///     let input = ctx.get("input").unwrap_or_default();
///     Ok(json!({ "echo": input }))
/// });
/// # let _ = action;
/// ```
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn TaskAction>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    Arc::new(FnAction(f))
}

/// Immutable description of one task in a workflow.
#[derive(Clone)]
pub struct TaskDefinition {
    /// Unique within its workflow.
    pub id: String,
    pub name: String,
    pub dependencies: Vec<String>,
    /// Retries allowed after the first failure; `N` permits `N + 1` attempts.
    pub max_retries: u32,
    /// Per-attempt budget.
    pub timeout: Option<Duration>,
    pub action: Arc<dyn TaskAction>,
}

impl TaskDefinition {
    /// A task named after its id, with no dependencies, retries or timeout.
    pub fn new(id: impl Into<String>, action: Arc<dyn TaskAction>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            dependencies: Vec::new(),
            max_retries: 0,
            timeout: None,
            action,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
