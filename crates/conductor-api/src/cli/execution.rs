//! Execution inspection commands: status, logs, and list.

use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use conductor_core::repository::execution::ExecutionStore;
use conductor_core::workflow::audit::AuditLog;
use conductor_types::execution::{ExecutionFailure, ExecutionState, TaskState, WorkflowExecution};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn handle_status(execution_id: &str, state: &AppState, json: bool) -> Result<()> {
    let exec = load_execution(execution_id, state).await?;
    let status = exec.status();

    if json {
        let out = serde_json::json!({
            "status": status,
            "tasks": exec.task_runs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Execution").bold(),
        style(exec.execution_id).cyan()
    );
    println!("  Workflow: {}", style(&exec.workflow_id).cyan());
    println!("  State: {}", style_exec_state(exec.state));
    if let Some(started) = exec.start_time {
        println!("  Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(ended) = exec.end_time {
        println!("  Ended: {}", ended.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
        "  Tasks: {} total, {} completed, {} failed, {} pending, {} running, {} skipped",
        status.tasks.total,
        status.tasks.completed,
        status.tasks.failed,
        status.tasks.pending,
        status.tasks.running,
        status.tasks.skipped
    );
    if let Some(failure) = &exec.error {
        print_failure(failure);
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Task").fg(Color::Cyan),
            Cell::new("State"),
            Cell::new("Attempts"),
            Cell::new("Retries"),
            Cell::new("Duration"),
            Cell::new("Error"),
        ]);
    for run in exec.task_runs.values() {
        table.add_row(vec![
            Cell::new(&run.task_id),
            format_task_state(run.state),
            Cell::new(run.attempts),
            Cell::new(run.retry_count),
            Cell::new(
                run.duration_ms()
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(run.error.as_deref().unwrap_or("-")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

pub async fn handle_logs(
    execution_id: &str,
    task: Option<&str>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let exec = load_execution(execution_id, state).await?;
    let entries: Vec<_> = match task {
        Some(task_id) => exec.events_for(task_id).collect(),
        None => exec.audit_log.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  No audit entries.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Time").fg(Color::Cyan),
            Cell::new("Event"),
            Cell::new("Task"),
            Cell::new("Details"),
        ]);
    for entry in &entries {
        let details = if entry.details.as_object().is_some_and(|m| m.is_empty()) {
            String::new()
        } else {
            entry.details.to_string()
        };
        table.add_row(vec![
            Cell::new(entry.timestamp.format("%H:%M:%S%.3f").to_string()),
            Cell::new(entry.event.as_str()),
            Cell::new(entry.task_id.as_deref().unwrap_or("-")),
            Cell::new(details),
        ]);
    }

    println!();
    println!(
        "  Audit log for execution {}",
        style(exec.execution_id).cyan()
    );
    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn handle_list(
    workflow: Option<&str>,
    limit: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let execs = state
        .store()
        .list(workflow, limit)
        .await
        .map_err(|e| anyhow!("Failed to list executions: {e}"))?;

    if json {
        let out: Vec<_> = execs.iter().map(WorkflowExecution::status).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if execs.is_empty() {
        println!();
        println!("  No executions recorded.");
        println!(
            "  Start one with: {}",
            style("cndr run <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution ID").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("State"),
            Cell::new("Tasks"),
            Cell::new("Started"),
        ]);
    for exec in &execs {
        let counts = exec.status().tasks;
        table.add_row(vec![
            Cell::new(exec.execution_id),
            Cell::new(&exec.workflow_id),
            format_exec_state(exec.state),
            Cell::new(format!("{}/{}", counts.completed, counts.total)),
            Cell::new(
                exec.start_time
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_execution(raw: &str, state: &AppState) -> Result<WorkflowExecution> {
    let id: Uuid = raw
        .parse()
        .with_context(|| format!("Invalid execution ID: '{raw}'"))?;
    state
        .store()
        .load(&id)
        .await
        .map_err(|e| anyhow!("Failed to load execution: {e}"))?
        .ok_or_else(|| anyhow!("Execution {id} not found"))
}

pub fn format_task_state(task_state: TaskState) -> Cell {
    let cell = Cell::new(task_state.to_string());
    match task_state {
        TaskState::Pending => cell.fg(Color::Yellow),
        TaskState::Running => cell.fg(Color::Blue),
        TaskState::Retrying => cell.fg(Color::Magenta),
        TaskState::Completed => cell.fg(Color::Green),
        TaskState::Failed => cell.fg(Color::Red),
        TaskState::Skipped => cell.fg(Color::DarkGrey),
    }
}

fn format_exec_state(exec_state: ExecutionState) -> Cell {
    let cell = Cell::new(exec_state.to_string());
    match exec_state {
        ExecutionState::Pending => cell.fg(Color::Yellow),
        ExecutionState::Running => cell.fg(Color::Blue),
        ExecutionState::Completed => cell.fg(Color::Green),
        ExecutionState::Failed => cell.fg(Color::Red),
        ExecutionState::Cancelled => cell.fg(Color::DarkYellow),
    }
}

fn style_exec_state(exec_state: ExecutionState) -> console::StyledObject<String> {
    let text = exec_state.to_string();
    match exec_state {
        ExecutionState::Completed => style(text).green(),
        ExecutionState::Failed => style(text).red(),
        ExecutionState::Cancelled => style(text).yellow(),
        ExecutionState::Pending | ExecutionState::Running => style(text).blue(),
    }
}

pub fn print_failure(failure: &ExecutionFailure) {
    println!("  Error: {}", style(failure).red());
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::config::GlobalConfig;

    async fn state_with(execs: &[WorkflowExecution]) -> (tempfile::TempDir, AppState) {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::init(tmp.path().to_path_buf(), GlobalConfig::default())
            .await
            .unwrap();
        for exec in execs {
            state.store().save(exec).await.unwrap();
        }
        (tmp, state)
    }

    #[tokio::test]
    async fn test_status_rejects_bad_id() {
        let (_tmp, state) = state_with(&[]).await;
        let err = handle_status("not-a-uuid", &state, true).await.unwrap_err();
        assert!(err.to_string().contains("Invalid execution ID"));
    }

    #[tokio::test]
    async fn test_status_unknown_execution() {
        let (_tmp, state) = state_with(&[]).await;
        let err = handle_status(&Uuid::now_v7().to_string(), &state, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_inspection_commands_on_stored_execution() {
        let exec = WorkflowExecution::new("wf");
        let (_tmp, state) = state_with(std::slice::from_ref(&exec)).await;
        let id = exec.execution_id.to_string();

        handle_status(&id, &state, true).await.unwrap();
        handle_logs(&id, None, &state, true).await.unwrap();
        handle_logs(&id, Some("a"), &state, false).await.unwrap();
        handle_list(Some("wf"), 5, &state, true).await.unwrap();
        handle_list(Some("other"), 5, &state, false).await.unwrap();
    }
}
