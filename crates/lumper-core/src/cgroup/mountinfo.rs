//! Discovery of cgroup v1 hierarchy mountpoints.

use std::path::PathBuf;

use super::{CgroupError, Result};

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Returns the mountpoint of the v1 hierarchy for `subsystem`.
///
/// # Errors
///
/// Returns [`CgroupError::MountPointNotFound`] if no `cgroup`-type mount
/// carries the subsystem option, or an I/O error if `/proc/self/mountinfo`
/// cannot be read.
pub(crate) fn find_mount_point(subsystem: &'static str) -> Result<PathBuf> {
    let content = std::fs::read_to_string(MOUNTINFO_PATH).map_err(|e| CgroupError::Io {
        path: MOUNTINFO_PATH.into(),
        source: e,
    })?;
    parse_mount_point(&content, subsystem).ok_or(CgroupError::MountPointNotFound(subsystem))
}

/// Scans mountinfo lines for a `cgroup`-type filesystem whose super options
/// contain `subsystem` as a comma-separated token.
///
/// Line format (see proc(5)):
/// `ID parent major:minor root MOUNT_POINT opts [optional...] - FSTYPE source SUPER_OPTS`
fn parse_mount_point(mountinfo: &str, subsystem: &str) -> Option<PathBuf> {
    for line in mountinfo.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }
        let Some(sep) = fields.iter().position(|f| *f == "-") else {
            continue;
        };
        if fields.get(sep + 1) != Some(&"cgroup") {
            continue;
        }
        let Some(super_opts) = fields.get(sep + 3) else {
            continue;
        };
        if super_opts.split(',').any(|tok| tok == subsystem) {
            return Some(PathBuf::from(fields[4]));
        }
    }
    None
}
