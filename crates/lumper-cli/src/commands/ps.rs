//! `lumper ps` — list containers.

use std::path::Path;

use clap::Args;

use lumper_common::constants::CONTAINERS_DIR;
use lumper_common::types::ContainerStatus;
use lumper_runtime::state;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (default shows just running).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the containers directory cannot be read.
pub fn execute(args: PsArgs) -> anyhow::Result<()> {
    let containers = state::list_infos(Path::new(CONTAINERS_DIR))?;

    let filtered: Vec<_> = if args.all {
        containers
    } else {
        containers
            .into_iter()
            .filter(|c| c.status == ContainerStatus::Running)
            .collect()
    };

    if filtered.is_empty() {
        println!("No containers found.");
        return Ok(());
    }

    println!(
        "{:<14} {:<16} {:<28} {:<20} {:<9} {:<8}",
        "CONTAINER ID", "IMAGE", "COMMAND", "CREATED", "STATUS", "PID"
    );
    for c in &filtered {
        println!(
            "{:<14} {:<16} {:<28} {:<20} {:<9} {:<8}",
            c.id, c.image, c.command, c.create_time, c.status, c.pid
        );
    }

    Ok(())
}
