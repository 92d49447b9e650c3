//! `lumper run` — launch a command inside a new container.

use clap::Args;

use lumper_common::types::ResourceConfig;
use lumper_runtime::container::{parse_volume, run_container, RunConfig};
use lumper_runtime::RunOutcome;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image to use as the container root (under the images directory).
    #[arg(short, long)]
    pub image: String,

    /// Keep the container attached to the current terminal.
    #[arg(long, conflicts_with = "detach")]
    pub it: bool,

    /// Run detached; stdout/stderr go to the container log.
    #[arg(short, long)]
    pub detach: bool,

    /// Memory limit in kernel format (e.g. 100m).
    #[arg(short, long)]
    pub memory: Option<String>,

    /// Number of CPUs the container may use.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub cpus: Option<u32>,

    /// Bind-mount a host directory, as HOST:CONTAINER.
    #[arg(short, long)]
    pub volume: Option<String>,

    /// Executable and its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub cmd: Vec<String>,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the volume specification is malformed or the run
/// pipeline fails.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = RunConfig::new(args.image, args.cmd);
    // --it and --detach are mutually exclusive; with neither, the run is
    // attached as if --it had been given.
    let attached = args.it || !args.detach;
    cfg.detach = !attached;
    cfg.resources = ResourceConfig {
        memory_limit: args.memory,
        cpus: args.cpus,
    };
    if let Some(spec) = &args.volume {
        cfg.volume = Some(parse_volume(spec)?);
    }

    let RunOutcome { id, status } = run_container(&cfg)?;
    match status {
        None => {
            // Detached: hand the ID to the operator and return.
            println!("{id}");
            Ok(())
        }
        Some(status) if status.success() => Ok(()),
        Some(status) => Err(anyhow::anyhow!("container {id} exited with {status:?}")),
    }
}
