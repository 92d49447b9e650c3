//! CLI command definitions and dispatch.

pub mod ps;
pub mod rm;
pub mod run;

use clap::{Parser, Subcommand};

/// lumper — run commands in lightweight containers.
#[derive(Parser, Debug)]
#[command(name = lumper_common::constants::APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside a new container.
    Run(run::RunArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Remove persisted container directories.
    Rm(rm::RmArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Ps(args) => ps::execute(args),
        Command::Rm(args) => rm::execute(args),
    }
}
