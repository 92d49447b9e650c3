//! # lumper — minimal container runtime CLI
//!
//! Launches a command inside fresh namespaces on a layered overlay rootfs
//! with cgroup-enforced resource limits, and manages the persisted
//! per-container records.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod commands;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
