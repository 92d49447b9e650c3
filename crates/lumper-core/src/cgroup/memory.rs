//! Memory subsystem (cgroup v1).

use std::path::PathBuf;

use super::{cgroup_path_for_subsystem, remove_cgroup_dir, write_file, Result, Subsystem};

const LIMIT_FILENAME: &str = "memory.limit_in_bytes";
const TASKS_FILENAME: &str = "tasks";

/// Per-container entry in the v1 `memory` hierarchy.
///
/// Construction creates the cgroup directory and writes the limit; dropping
/// the entry removes the directory again.
pub struct MemorySubsystem {
    cgroup_path: PathBuf,
}

impl MemorySubsystem {
    const NAME: &'static str = "memory";

    /// Creates `<memory mountpoint>/<cgroup_name>` and writes
    /// `memory.limit_in_bytes`.
    ///
    /// The limit string goes in verbatim (e.g. `"100m"`); whether the
    /// kernel accepts a given suffix is left to the kernel.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy is not mounted or the directory or
    /// limit file cannot be written; a directory created before the failure
    /// is rolled back.
    pub fn new(cgroup_name: &str, memory_limit: &str) -> Result<Self> {
        debug_assert!(!cgroup_name.is_empty());
        debug_assert!(!memory_limit.is_empty());

        let cgroup_path = cgroup_path_for_subsystem(Self::NAME, cgroup_name)?;
        if let Err(err) = write_file(&cgroup_path.join(LIMIT_FILENAME), memory_limit) {
            remove_cgroup_dir(&cgroup_path);
            return Err(err);
        }
        tracing::debug!(path = %cgroup_path.display(), limit = memory_limit, "memory cgroup created");
        Ok(Self { cgroup_path })
    }
}

impl Subsystem for MemorySubsystem {
    fn apply(&self, pid: libc::pid_t) -> Result<()> {
        write_file(&self.cgroup_path.join(TASKS_FILENAME), &pid.to_string())
    }
}

impl Drop for MemorySubsystem {
    fn drop(&mut self) {
        remove_cgroup_dir(&self.cgroup_path);
    }
}
