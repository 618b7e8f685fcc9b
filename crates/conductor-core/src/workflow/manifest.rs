//! YAML workflow manifests.
//!
//! A manifest is the declarative, serializable form of a workflow: ids,
//! dependencies, retry budgets, timeouts, and an opaque `run` string per
//! task. It carries no executable code, so turning it into
//! `TaskDefinition`s takes a binder that maps each task to an action (the
//! CLI binds `run` to a shell command).
//!
//! ```yaml
//! id: nightly-report
//! tasks:
//!   - id: extract
//!     run: ./extract.sh
//!     max_retries: 2
//!   - id: summarize
//!     depends_on: [extract]
//!     timeout_secs: 60
//!     run: ./summarize.sh
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::dag::validate_dag;
use super::error::WorkflowError;
use super::task::{TaskAction, TaskDefinition};

/// A workflow as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowManifest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<TaskManifest>,
}

/// One task entry in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Opaque instruction handed to the binder.
    pub run: String,
}

impl WorkflowManifest {
    /// Build task definitions, asking `bind` for each task's action.
    pub fn into_definitions<F>(self, mut bind: F) -> Vec<TaskDefinition>
    where
        F: FnMut(&TaskManifest) -> Arc<dyn TaskAction>,
    {
        self.tasks
            .into_iter()
            .map(|task| {
                let action = bind(&task);
                let mut def = TaskDefinition::new(task.id, action)
                    .depends_on(task.depends_on)
                    .with_max_retries(task.max_retries);
                if let Some(name) = task.name {
                    def = def.with_name(name);
                }
                if let Some(secs) = task.timeout_secs {
                    def = def.with_timeout(Duration::from_secs(secs));
                }
                def
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowManifest`.
pub fn parse_manifest_yaml(yaml: &str) -> Result<WorkflowManifest, WorkflowError> {
    let manifest: WorkflowManifest =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

pub fn serialize_manifest_yaml(manifest: &WorkflowManifest) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(manifest).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a manifest.
///
/// Checks:
/// - Workflow and task ids are non-empty and use only alphanumerics, `-`, `_`
/// - `timeout_secs` > 0 if set
/// - Task graph is a DAG (unique ids, known dependencies, no cycles)
pub fn validate_manifest(manifest: &WorkflowManifest) -> Result<(), WorkflowError> {
    check_id("workflow", &manifest.id)?;
    for task in &manifest.tasks {
        check_id("task", &task.id)?;
        if task.timeout_secs == Some(0) {
            return Err(WorkflowError::ValidationError(format!(
                "task '{}': timeout_secs must be > 0",
                task.id
            )));
        }
    }
    validate_dag(&manifest.tasks)
}

fn check_id(kind: &str, id: &str) -> Result<(), WorkflowError> {
    if id.is_empty() {
        return Err(WorkflowError::ValidationError(format!(
            "{kind} id must not be empty"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(WorkflowError::ValidationError(format!(
            "{kind} id '{id}' contains invalid characters (only alphanumeric, '-' and '_' allowed)"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a manifest from a YAML file.
pub fn load_manifest_file(path: &Path) -> Result<WorkflowManifest, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest_yaml(&content)
}

/// Save a manifest to a YAML file, creating parent directories.
pub fn save_manifest_file(path: &Path, manifest: &WorkflowManifest) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize_manifest_yaml(manifest)?)?;
    Ok(())
}
