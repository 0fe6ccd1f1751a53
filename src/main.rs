#![warn(unused_extern_crates)]

mod actions;
mod aws_sts;
mod cmd;
mod commands;
mod utils;

use clap::Parser;
use cmd::Cli;
use std::process::ExitCode;
use tracing::error;

const SHOW_STACK_TRACE_VAR: &str = "SHOW_STACK_TRACE";

#[tokio::main]
async fn main() -> Result<ExitCode, commands::Error> {
    if let Err(err) = utils::log::init_logging() {
        eprintln!("Failed to initialize logging: {err}");
    }
    let cli = Cli::parse();

    match commands::exec_command(cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            error!("{err}");
            if std::env::var(SHOW_STACK_TRACE_VAR).is_ok_and(|v| v == "true") {
                return Err(err);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
