//! `lumper rm` — remove persisted container directories.

use std::path::Path;

use clap::Args;

use lumper_common::constants::CONTAINERS_DIR;
use lumper_runtime::state;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// IDs of the containers to remove.
    #[arg(required = true)]
    pub container_ids: Vec<String>,
}

/// Executes the `rm` command.
///
/// Removal is unconditional; a container still marked running is deleted
/// like any other.
///
/// # Errors
///
/// Returns an error if a container tree exists but cannot be removed.
pub fn execute(args: RmArgs) -> anyhow::Result<()> {
    for id in &args.container_ids {
        if state::remove_container(Path::new(CONTAINERS_DIR), id)? {
            println!("Container {id} is deleted");
        } else {
            println!("Container {id} not found");
        }
    }
    Ok(())
}
