//! Workflow engine core: task contract, DAG validation, scheduling, retries,
//! audit trail, and YAML manifests.
//!
//! - `task` -- task definitions and the `TaskAction` contract
//! - `dag` -- DAG validation, topological order, dependent closure
//! - `context` -- shared execution context handed to actions
//! - `scheduler` -- ready-set computation and stuck detection
//! - `retry` -- attempt budget and exponential backoff
//! - `audit` -- append-only audit log helpers
//! - `engine` -- registration and the execution loop
//! - `manifest` -- YAML manifest parsing and filesystem load/save

pub mod audit;
pub mod context;
pub mod dag;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use context::ExecutionContext;
pub use engine::WorkflowEngine;
pub use error::{EngineError, TaskExecutionError, WorkflowError};
pub use task::{ActionError, TaskAction, TaskDefinition, action_fn};
