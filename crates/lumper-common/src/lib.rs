//! # lumper-common
//!
//! Shared foundations for the Lumper workspace:
//! - **Errors**: the workspace-wide [`error::LumperError`] enum.
//! - **Types**: container IDs, lifecycle status, resource limits.
//! - **Constants**: on-disk layout under `/var/lib/lumper`.

pub mod constants;
pub mod error;
pub mod types;
