//! cpdbatch - run DataStage quality jobs of a Cloud Pak for Data project
//!
//! Main entry point for the command-line tool.

mod cli;
mod commands;
mod logging;
mod report;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    let outcome = match cli.command {
        Command::Run(args) => commands::run(args).await,
        Command::Matrix(args) => commands::matrix(args).await,
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format_args!("{err:#}"), "cpdbatch failed");
            ExitCode::FAILURE
        }
    }
}
