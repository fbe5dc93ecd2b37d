mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::{Cli, Command};
use crate::commands::UploadArgs;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use std::process::ExitCode;
use stow_config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let _guard = logging::init(&config.log_dir, cli.log_level())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Command::Upload { container, table, workers, path_cutoff } => {
            let args = UploadArgs { container: &container, table: &table, workers, cutoff: path_cutoff.as_deref() };
            commands::upload(&config, args).await
        },
        Command::Prepare { directory, table } => commands::prepare(&config, &directory, &table).await,
        Command::Status { table } => commands::status(&config, &table).await,
    }
}
