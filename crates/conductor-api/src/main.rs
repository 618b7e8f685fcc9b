//! Conductor CLI entry point.
//!
//! Binary name: `cndr`
//!
//! Parses CLI arguments, loads config.toml, initializes tracing and the
//! execution store, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use conductor_infra::config::load_global_config;
use conductor_infra::filesystem::resolve_data_dir;
use conductor_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "cndr", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    let config = load_global_config(&data_dir).await;
    if let Err(e) = init_tracing(&config.logging, cli.verbose, cli.quiet) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }
    tracing::debug!(data_dir = %data_dir.display(), "configuration loaded");

    let result = dispatch(cli, data_dir, config).await;
    shutdown_tracing();
    result
}

async fn dispatch(
    cli: Cli,
    data_dir: std::path::PathBuf,
    config: conductor_types::config::GlobalConfig,
) -> anyhow::Result<()> {
    // Validation is offline: no database needed.
    if let Commands::Validate { file } = &cli.command {
        return cli::workflow::handle_validate(file, cli.json, cli.quiet);
    }

    let state = AppState::init(data_dir, config).await?;

    match cli.command {
        Commands::Run {
            file,
            overrides,
            context,
        } => {
            cli::workflow::handle_run(
                &file,
                &overrides,
                context.as_deref(),
                &state,
                cli.json,
                cli.quiet,
            )
            .await
        }

        Commands::Resume {
            execution_id,
            file,
            all,
            overrides,
        } => {
            cli::workflow::handle_resume(
                execution_id.as_deref(),
                &file,
                all,
                &overrides,
                &state,
                cli.json,
                cli.quiet,
            )
            .await
        }

        Commands::Status { execution_id } => {
            cli::execution::handle_status(&execution_id, &state, cli.json).await
        }

        Commands::Logs { execution_id, task } => {
            cli::execution::handle_logs(&execution_id, task.as_deref(), &state, cli.json).await
        }

        Commands::List { workflow, limit } => {
            cli::execution::handle_list(workflow.as_deref(), limit, &state, cli.json).await
        }

        Commands::Validate { .. } | Commands::Completions { .. } => unreachable!("handled above"),
    }
}
