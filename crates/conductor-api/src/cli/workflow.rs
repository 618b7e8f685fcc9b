//! Manifest-driven commands: validate, run, and resume.
//!
//! Every manifest task is bound to a [`ShellAction`] that runs the task's
//! `run` string from the manifest's directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use uuid::Uuid;

use conductor_core::workflow::dag::{execution_waves, topological_order};
use conductor_core::workflow::manifest::{WorkflowManifest, load_manifest_file};
use conductor_core::workflow::{TaskAction, TaskDefinition, WorkflowError};
use conductor_infra::process::ShellAction;
use conductor_types::execution::{ExecutionState, WorkflowExecution};

use super::EngineOverrides;
use super::execution::{format_task_state, print_failure};
use crate::state::{AppState, ConcreteEngine};

/// Load a manifest and bind each task to a shell action.
pub fn load_workflow(file: &Path) -> Result<(WorkflowManifest, Vec<TaskDefinition>)> {
    let manifest = load_manifest_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow!("Failed to parse workflow YAML: {msg}"),
        WorkflowError::ValidationError(msg) => anyhow!("Workflow validation failed: {msg}"),
        WorkflowError::IoError(err) => {
            anyhow!("Failed to read workflow file {}: {err}", file.display())
        }
        other => anyhow!("Invalid workflow: {other}"),
    })?;

    let base_dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let tasks = manifest.clone().into_definitions(|task| {
        Arc::new(ShellAction::new(task.run.clone()).with_working_dir(base_dir.clone()))
            as Arc<dyn TaskAction>
    });
    Ok((manifest, tasks))
}

/// Parse `--context` into context entries. Must be a JSON object.
pub fn parse_context(raw: Option<&str>) -> Result<Vec<(String, Value)>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid JSON context")? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => bail!("Context must be a JSON object, got: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn handle_validate(file: &Path, json: bool, quiet: bool) -> Result<()> {
    let (manifest, _) = load_workflow(file)?;
    let order = topological_order(&manifest.tasks)?;
    let waves = execution_waves(&manifest.tasks)?;

    if json {
        let out = serde_json::json!({
            "workflow_id": manifest.id,
            "valid": true,
            "tasks": manifest.tasks.len(),
            "order": order,
            "waves": waves,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow '{}' is valid ({} tasks)",
        style("✓").green().bold(),
        style(&manifest.id).cyan(),
        manifest.tasks.len()
    );
    println!();
    for (i, wave) in waves.iter().enumerate() {
        println!("  {} {}", style(format!("wave {}:", i + 1)).dim(), wave.join(", "));
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    file: &Path,
    overrides: &EngineOverrides,
    context: Option<&str>,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let (manifest, tasks) = load_workflow(file)?;
    let initial = parse_context(context)?;

    let engine = state.engine(overrides);
    engine
        .register_workflow(manifest.id.as_str(), tasks)
        .with_context(|| format!("Failed to register workflow '{}'", manifest.id))?;

    if !json && !quiet {
        println!();
        println!(
            "  {} Running workflow '{}'",
            style("▶").cyan().bold(),
            style(&manifest.id).cyan()
        );
    }

    let exec = until_ctrl_c(&engine, engine.execute(&manifest.id, initial)).await?;
    report(&exec, json, quiet)
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

pub async fn handle_resume(
    execution_id: Option<&str>,
    file: &Path,
    all: bool,
    overrides: &EngineOverrides,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let (manifest, tasks) = load_workflow(file)?;
    let engine = state.engine(overrides);
    engine
        .register_workflow(manifest.id.as_str(), tasks)
        .with_context(|| format!("Failed to register workflow '{}'", manifest.id))?;

    let targets: Vec<Uuid> = if all {
        engine
            .recover_interrupted()
            .await?
            .into_iter()
            .filter(|e| e.workflow_id == manifest.id)
            .map(|e| e.execution_id)
            .collect()
    } else {
        let raw = execution_id.ok_or_else(|| anyhow!("An execution id or --all is required"))?;
        let id: Uuid = raw
            .parse()
            .with_context(|| format!("Invalid execution ID: '{raw}'"))?;
        let stored = engine.load(&id).await?;
        if stored.workflow_id != manifest.id {
            bail!(
                "Execution {id} belongs to workflow '{}', not '{}'",
                stored.workflow_id,
                manifest.id
            );
        }
        vec![id]
    };

    if targets.is_empty() {
        if json {
            println!("[]");
        } else if !quiet {
            println!();
            println!("  No interrupted executions for '{}'.", manifest.id);
            println!();
        }
        return Ok(());
    }

    let mut finished = Vec::with_capacity(targets.len());
    for id in targets {
        if !json && !quiet {
            println!();
            println!(
                "  {} Resuming execution {}",
                style("▶").cyan().bold(),
                style(id).cyan()
            );
        }
        finished.push(until_ctrl_c(&engine, engine.resume(&id)).await?);
    }

    if json && finished.len() > 1 {
        println!("{}", serde_json::to_string_pretty(&finished)?);
        return check_all(&finished);
    }
    for exec in &finished {
        report(exec, json, quiet)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Drive `run` to completion, cancelling live executions on Ctrl+C.
async fn until_ctrl_c<F>(engine: &ConcreteEngine, run: F) -> Result<WorkflowExecution>
where
    F: std::future::Future<Output = Result<WorkflowExecution, conductor_core::workflow::EngineError>>,
{
    tokio::pin!(run);
    let exec = tokio::select! {
        res = &mut run => res?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("  Interrupted, cancelling...");
            engine.cancel_all();
            run.await?
        }
    };
    Ok(exec)
}

/// Print the outcome. A non-completed execution becomes an error exit.
fn report(exec: &WorkflowExecution, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(exec)?);
    } else if !quiet {
        print_summary(exec);
    }
    check_all(std::slice::from_ref(exec))
}

fn check_all(execs: &[WorkflowExecution]) -> Result<()> {
    match execs.iter().find(|e| e.state != ExecutionState::Completed) {
        Some(exec) => bail!("execution {} finished {}", exec.execution_id, exec.state),
        None => Ok(()),
    }
}

fn print_summary(exec: &WorkflowExecution) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Task").fg(Color::Cyan),
            Cell::new("State"),
            Cell::new("Attempts"),
            Cell::new("Duration"),
        ]);
    for run in exec.task_runs.values() {
        table.add_row(vec![
            Cell::new(&run.task_id),
            format_task_state(run.state),
            Cell::new(run.attempts),
            Cell::new(
                run.duration_ms()
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    let marker = match exec.state {
        ExecutionState::Completed => style("✓").green().bold(),
        ExecutionState::Cancelled => style("!").yellow().bold(),
        _ => style("✗").red().bold(),
    };
    println!("  {marker} Execution {} {}", exec.execution_id, exec.state);
    if let Some(failure) = &exec.error {
        print_failure(failure);
    }
    println!();
}
