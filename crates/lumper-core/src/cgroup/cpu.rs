//! CPU subsystem (cgroup v1).

use std::io;
use std::path::PathBuf;

use super::{
    cgroup_path_for_subsystem, remove_cgroup_dir, write_file, CgroupError, Result, Subsystem,
};

const PERIOD_FILENAME: &str = "cpu.cfs_period_us";
const QUOTA_FILENAME: &str = "cpu.cfs_quota_us";
const TASKS_FILENAME: &str = "tasks";

/// Per-container entry in the v1 `cpu` hierarchy.
///
/// The quota is computed against the hierarchy's CFS period:
/// `cpu.cfs_quota_us = cpus * cpu.cfs_period_us`.
pub struct CpuSubsystem {
    cgroup_path: PathBuf,
}

impl CpuSubsystem {
    const NAME: &'static str = "cpu";

    /// Creates `<cpu mountpoint>/<cgroup_name>` and writes the CFS quota
    /// for `cpus` whole CPUs.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy is not mounted or the period
    /// cannot be read or the quota written; a directory created before the
    /// failure is rolled back.
    pub fn new(cgroup_name: &str, cpus: u32) -> Result<Self> {
        debug_assert!(!cgroup_name.is_empty());
        debug_assert!(cpus > 0);

        let cgroup_path = cgroup_path_for_subsystem(Self::NAME, cgroup_name)?;
        if let Err(err) = write_quota(&cgroup_path, cpus) {
            remove_cgroup_dir(&cgroup_path);
            return Err(err);
        }
        tracing::debug!(path = %cgroup_path.display(), cpus, "cpu cgroup created");
        Ok(Self { cgroup_path })
    }
}

fn write_quota(cgroup_path: &std::path::Path, cpus: u32) -> Result<()> {
    let period_path = cgroup_path.join(PERIOD_FILENAME);
    let period = std::fs::read_to_string(&period_path).map_err(|e| CgroupError::Io {
        path: period_path.clone(),
        source: e,
    })?;
    let period: u64 = period.trim().parse().map_err(|e| CgroupError::Io {
        path: period_path,
        source: io::Error::new(io::ErrorKind::InvalidData, format!("bad CFS period: {e}")),
    })?;

    let quota = u64::from(cpus) * period;
    write_file(&cgroup_path.join(QUOTA_FILENAME), &quota.to_string())
}

impl Subsystem for CpuSubsystem {
    fn apply(&self, pid: libc::pid_t) -> Result<()> {
        write_file(&self.cgroup_path.join(TASKS_FILENAME), &pid.to_string())
    }
}

impl Drop for CpuSubsystem {
    fn drop(&mut self) {
        remove_cgroup_dir(&self.cgroup_path);
    }
}
