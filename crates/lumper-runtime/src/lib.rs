//! # lumper-runtime
//!
//! Orchestration above `lumper-core`:
//! - **[`container`]**: builds the per-container overlay tree and drives the
//!   spawn → cgroup-attach → wait pipeline.
//! - **[`state`]**: persists per-container metadata records (`config.json`)
//!   consumed by `ps` and `rm`.

pub mod container;
pub mod state;

pub use container::{run_container, RunConfig, RunOutcome, RuntimeError};
pub use state::ContainerInfo;
