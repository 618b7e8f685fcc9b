//! CLI command definitions for the `cndr` binary.
//!
//! Uses clap derive macros for argument parsing. Manifest commands
//! (`validate`, `run`, `resume`) take a workflow YAML file; inspection
//! commands (`status`, `logs`, `list`) read the execution store.

pub mod execution;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use conductor_types::config::FailurePolicy;

/// Run DAG workflows with retries, an audit trail, and resumable state.
#[derive(Parser)]
#[command(name = "cndr", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a workflow file without running it.
    Validate {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// Run a workflow file to completion.
    Run {
        /// Path to the workflow YAML file.
        file: PathBuf,

        #[command(flatten)]
        overrides: EngineOverrides,

        /// Initial context as a JSON object.
        #[arg(long)]
        context: Option<String>,
    },

    /// Show the state of an execution and each of its tasks.
    Status {
        /// Execution UUID.
        execution_id: String,
    },

    /// Show the audit log of an execution.
    Logs {
        /// Execution UUID.
        execution_id: String,

        /// Only show entries for this task.
        #[arg(long)]
        task: Option<String>,
    },

    /// List recent executions.
    #[command(alias = "ls")]
    List {
        /// Filter by workflow id.
        #[arg(long)]
        workflow: Option<String>,

        /// Maximum number of executions to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Continue an interrupted execution.
    ///
    /// An execution counts as interrupted when it is stored as RUNNING and
    /// this process is not driving it. Run one conductor process per data
    /// directory: a `cndr run` still active elsewhere looks interrupted too,
    /// and resuming it would run its tasks twice.
    Resume {
        /// Execution UUID (omit with --all).
        #[arg(required_unless_present = "all")]
        execution_id: Option<String>,

        /// Path to the workflow YAML file the execution was started from.
        #[arg(long, short)]
        file: PathBuf,

        /// Resume every interrupted execution of this workflow. Only safe
        /// when no other conductor process uses the same data directory.
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        overrides: EngineOverrides,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Per-invocation overrides of `[engine]` in config.toml.
#[derive(clap::Args, Debug, Default)]
pub struct EngineOverrides {
    /// Maximum tasks running at once.
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// What to do once a task fails permanently.
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Let attempts outlive their declared timeout.
    #[arg(long)]
    pub no_timeouts: bool,

    /// Backoff unit in milliseconds.
    #[arg(long)]
    pub backoff_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    FailFast,
    SkipDependents,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FailFast => FailurePolicy::FailFast,
            PolicyArg::SkipDependents => FailurePolicy::SkipDependents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "cndr",
            "run",
            "wf.yaml",
            "--parallelism",
            "4",
            "--policy",
            "skip-dependents",
            "--context",
            r#"{"input": 1}"#,
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                file,
                overrides,
                context,
            } => {
                assert_eq!(file, PathBuf::from("wf.yaml"));
                assert_eq!(overrides.parallelism, Some(4));
                assert_eq!(overrides.policy, Some(PolicyArg::SkipDependents));
                assert!(!overrides.no_timeouts);
                assert!(context.is_some());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_resume_requires_id_or_all() {
        assert!(Cli::try_parse_from(["cndr", "resume", "-f", "wf.yaml"]).is_err());
        assert!(Cli::try_parse_from(["cndr", "resume", "-f", "wf.yaml", "--all"]).is_ok());
    }

    #[test]
    fn test_resume_help_states_single_process_assumption() {
        let mut cmd = Cli::command();
        let resume = cmd.find_subcommand_mut("resume").unwrap();
        let help = resume.render_long_help().to_string();
        assert!(help.contains("one conductor process"));
        assert!(help.contains("no other conductor process"));
    }
}
