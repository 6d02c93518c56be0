mod cli;
mod commands;
mod prompt;
mod sample;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use herring_qc_lib::core::TestState;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Exit status when the overall QC verdict is fail
const EXIT_QC_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = commands::load_settings(cli.settings.as_deref())?;
    let engine = commands::build_engine(settings)?;

    match cli.command {
        Commands::Check(args) => {
            let overall = commands::check::run(args, &engine).await?;
            if overall == TestState::Fail {
                return Ok(ExitCode::from(EXIT_QC_FAILED));
            }
        }
        Commands::Catalog(args) => commands::catalog::run(args, &engine)?,
        Commands::Ranges(args) => commands::ranges::run(args, &engine)?,
        Commands::Bounds(args) => commands::bounds::run(args, &engine)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Logs to stderr, plus a daily-rolling file when a directory is given
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let mut dir_error = None;
    let log_dir = log_dir.and_then(|dir| match prepare_log_dir(dir) {
        Ok(()) => Some(dir),
        Err(err) => {
            dir_error = Some((dir.to_path_buf(), err));
            None
        }
    });

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "herring-qc.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    // Avoid panics if already initialized
    let _ = tracing::subscriber::set_global_default(subscriber);
    if let Some((dir, err)) = dir_error {
        warn!("Cannot create log directory {}: {}; logging to stderr only", dir.display(), err);
    }
    guard
}

fn prepare_log_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
