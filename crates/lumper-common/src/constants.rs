//! System-wide constants and default paths.

// `concat!` only accepts literals, so the base path lives in a macro.
macro_rules! data_dir {
    () => {
        "/var/lib/lumper"
    };
}

/// Base directory for all Lumper data.
pub const DATA_DIR: &str = data_dir!();

/// Directory holding extracted image trees, one subdirectory per image.
pub const IMAGES_DIR: &str = concat!(data_dir!(), "/images");

/// Directory holding per-container state, one subdirectory per container ID.
pub const CONTAINERS_DIR: &str = concat!(data_dir!(), "/containers");

/// Per-container metadata file name.
pub const INFO_FILENAME: &str = "config.json";

/// Per-container log file name (stdout/stderr of detached containers).
pub const CONTAINER_LOG_FILENAME: &str = "container.log";

/// Copy-on-write upper layer directory name inside a container tree.
pub const COW_RW_DIR: &str = "cow_rw";

/// Overlay work directory name inside a container tree.
pub const COW_WORK_DIR: &str = "cow_workdir";

/// Overlay mount point directory name inside a container tree.
pub const ROOTFS_DIR: &str = "rootfs";

/// Binary name of the CLI.
pub const APP_NAME: &str = "lumper";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_paths_share_the_base_directory() {
        assert!(IMAGES_DIR.starts_with(DATA_DIR));
        assert!(CONTAINERS_DIR.starts_with(DATA_DIR));
    }
}
