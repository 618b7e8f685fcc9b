//! Shell-command task actions.
//!
//! `ShellAction` runs a manifest task's `run` string through `sh -c`. The
//! execution context is exported as JSON in `CONDUCTOR_CONTEXT`; stdout
//! becomes the task's result (parsed as JSON when possible, else kept as a
//! trimmed string). A non-zero exit is a failed attempt carrying stderr.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use conductor_core::workflow::context::ExecutionContext;
use conductor_core::workflow::task::{ActionError, ActionFuture, TaskAction};
use serde_json::Value;
use tokio::process::Command;

/// Environment variable carrying the context snapshot.
pub const CONTEXT_ENV: &str = "CONDUCTOR_CONTEXT";
/// Environment variable carrying the execution id.
pub const EXECUTION_ID_ENV: &str = "CONDUCTOR_EXECUTION_ID";

/// A task action that runs a shell command.
#[derive(Debug, Clone)]
pub struct ShellAction {
    command: String,
    working_dir: Option<PathBuf>,
}

impl ShellAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
        }
    }

    /// Run the command from `dir` (the manifest's directory for the CLI).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl TaskAction for ShellAction {
    fn run(&self, ctx: ExecutionContext) -> ActionFuture {
        let action = self.clone();
        Box::pin(async move { action.run_command(&ctx).await.map_err(ActionError::from) })
    }
}

impl ShellAction {
    async fn run_command(&self, ctx: &ExecutionContext) -> Result<Value> {
        let context_json =
            serde_json::to_string(&ctx.snapshot()).context("serializing execution context")?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env(CONTEXT_ENV, context_json)
            .env(EXECUTION_ID_ENV, ctx.execution_id().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(cmd = self.command.as_str(), "spawning shell task");

        let output = tokio::select! {
            out = cmd.output() => out.with_context(|| format!("spawning `{}`", self.command))?,
            _ = ctx.cancelled() => bail!("cancelled while running `{}`", self.command),
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("`{}` exited with code {code}", self.command);
            }
            bail!("`{}` exited with code {code}: {stderr}", self.command);
        }

        Ok(parse_stdout(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Empty output is `null`; valid JSON is kept as JSON; anything else is a string.
fn parse_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_stdout_variants() {
        assert_eq!(parse_stdout("  \n"), Value::Null);
        assert_eq!(parse_stdout("{\"rows\": 3}\n"), json!({"rows": 3}));
        assert_eq!(parse_stdout("done\n"), json!("done"));
    }

    #[tokio::test]
    async fn stdout_becomes_result() {
        let action = ShellAction::new("echo '{\"ok\": true}'");
        let value = action.run(ExecutionContext::detached([])).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn context_is_exported_as_json() {
        let action = ShellAction::new("printf '%s' \"$CONDUCTOR_CONTEXT\"");
        let ctx = ExecutionContext::detached([("input".to_string(), json!("a.csv"))]);
        let value = action.run(ctx).await.unwrap();
        assert_eq!(value, json!({"input": "a.csv"}));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error_with_stderr() {
        let action = ShellAction::new("echo 'disk full' >&2; exit 3");
        let err = action
            .run(ExecutionContext::detached([]))
            .await
            .unwrap_err();
        assert!(err.message().contains("code 3"), "got: {}", err.message());
        assert!(err.message().contains("disk full"));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let action = ShellAction::new("cat marker.txt").with_working_dir(dir.path());
        let value = action.run(ExecutionContext::detached([])).await.unwrap();
        assert_eq!(value, json!("here"));
    }
}
