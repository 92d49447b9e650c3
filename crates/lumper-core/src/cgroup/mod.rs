//! Cgroup v1 resource management.
//!
//! Each enabled subsystem owns a per-container directory under that
//! subsystem's hierarchy mountpoint (discovered from
//! `/proc/self/mountinfo`). Construction creates the directory and writes
//! the limit files; [`CgroupManager::apply`] attaches a PID via the `tasks`
//! file; destruction removes the directories, tolerating `ENOENT` and
//! logging (never panicking) on anything else — the kernel returns `EBUSY`
//! while tasks remain attached, and process lifecycle is the caller's
//! responsibility.

pub mod cpu;
pub mod memory;
mod mountinfo;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use lumper_common::types::ResourceConfig;

pub use cpu::CpuSubsystem;
pub use memory::MemorySubsystem;

/// Errors raised by cgroup construction and attachment.
#[derive(Debug, Error)]
pub enum CgroupError {
    /// The subsystem's v1 hierarchy is not mounted on this host.
    #[error("cannot find mountpoint of subsystem {0}")]
    MountPointNotFound(&'static str),

    /// A cgroup filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Convenience alias for cgroup operations.
pub type Result<T> = std::result::Result<T, CgroupError>;

/// One managed cgroup v1 subsystem entry.
pub trait Subsystem {
    /// Attaches `pid` to this subsystem's per-container cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if the `tasks` file cannot be written.
    fn apply(&self, pid: libc::pid_t) -> Result<()>;
}

/// Creates and owns one subsystem entry per present resource-config field.
///
/// Subsystems are constructed in a fixed order (memory, then cpu) and
/// destructed in reverse. A construction failure cleans up the entries
/// already built.
pub struct CgroupManager {
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl CgroupManager {
    /// Builds the subsystem entries named by `cfg` under `name`.
    ///
    /// Concurrent managers in one process must use distinct names; the
    /// kernel serializes the directory operations themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if a subsystem mountpoint cannot be found or a
    /// cgroup directory or limit file cannot be created. Entries built
    /// before the failure are removed again.
    pub fn new(name: &str, cfg: &ResourceConfig) -> Result<Self> {
        let mut subsystems: Vec<Box<dyn Subsystem>> = Vec::new();
        if let Some(limit) = &cfg.memory_limit {
            subsystems.push(Box::new(MemorySubsystem::new(name, limit)?));
        }
        if let Some(cpus) = cfg.cpus {
            subsystems.push(Box::new(CpuSubsystem::new(name, cpus)?));
        }
        tracing::info!(count = subsystems.len(), "enabled cgroup subsystems");
        Ok(Self { subsystems })
    }

    /// Writes `pid` into every managed subsystem's `tasks` file.
    ///
    /// Must be called after the process exists in the kernel.
    ///
    /// # Errors
    ///
    /// Returns the first attachment failure.
    pub fn apply(&self, pid: libc::pid_t) -> Result<()> {
        for subsystem in &self.subsystems {
            subsystem.apply(pid)?;
        }
        Ok(())
    }

    /// Number of managed subsystem entries.
    #[must_use]
    pub fn subsystem_count(&self) -> usize {
        self.subsystems.len()
    }
}

impl Drop for CgroupManager {
    fn drop(&mut self) {
        // A Vec drops front to back; pop to destruct in reverse
        // construction order.
        while let Some(subsystem) = self.subsystems.pop() {
            drop(subsystem);
        }
    }
}

/// Resolves `<subsystem mountpoint>/<cgroup_name>`, creating the directory
/// (mode 0755) if needed.
pub(crate) fn cgroup_path_for_subsystem(
    subsystem: &'static str,
    cgroup_name: &str,
) -> Result<PathBuf> {
    let root = mountinfo::find_mount_point(subsystem)?;
    let path = root.join(cgroup_name);
    if !path.exists() {
        use std::os::unix::fs::DirBuilderExt;
        let mut builder = std::fs::DirBuilder::new();
        builder.mode(0o755);
        if let Err(err) = builder.create(&path) {
            if err.kind() != io::ErrorKind::AlreadyExists {
                return Err(CgroupError::Io { path, source: err });
            }
        }
    }
    Ok(path)
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| CgroupError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Removes a cgroup directory, tolerating `ENOENT`.
///
/// Used both for rollback during construction and from the subsystem
/// destructors, which must never propagate an error.
pub(crate) fn remove_cgroup_dir(path: &Path) {
    if let Err(err) = std::fs::remove_dir(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::error!(
                path = %path.display(),
                error = %err,
                "failed to clean up cgroup directory"
            );
        }
    }
}
