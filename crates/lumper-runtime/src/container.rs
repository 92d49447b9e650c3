//! Container root construction and the run pipeline.
//!
//! `run` builds the per-container overlay tree under the containers
//! directory, spawns the command inside fresh namespaces with the
//! containment hook installed, attaches the child to its cgroups, persists
//! the metadata record, and (for foreground runs) waits for exit.

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::sched::CloneFlags;
use thiserror::Error;

use lumper_common::constants::{
    CONTAINERS_DIR, CONTAINER_LOG_FILENAME, COW_RW_DIR, COW_WORK_DIR, IMAGES_DIR, ROOTFS_DIR,
};
use lumper_common::error::LumperError;
use lumper_common::types::{ContainerId, ContainerStatus, ResourceConfig};
use lumper_core::cgroup::{CgroupError, CgroupManager};
use lumper_core::mount::{HookSetupError, MountContainer, MountErrc};
use lumper_core::process::{ExitStatus, Options, SpawnError, StdioAction, Subprocess};

use crate::state::{self, ContainerInfo};

/// Errors raised by the run pipeline.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A required image or container was missing.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A `-v HOST:CONTAINER` specification was malformed or unusable.
    #[error("invalid volume specification: {0}")]
    InvalidVolume(String),

    /// The subprocess launcher failed.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Cgroup construction or attachment failed.
    #[error(transparent)]
    Cgroup(#[from] CgroupError),

    /// The containment hook's plan could not be built.
    #[error(transparent)]
    Hook(#[from] HookSetupError),

    /// Metadata persistence failed.
    #[error(transparent)]
    Metadata(#[from] LumperError),
}

/// Convenience alias for run-pipeline operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Everything needed to launch one container.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Image name under the images directory.
    pub image: String,
    /// Command line to execute inside the container.
    pub command: Vec<String>,
    /// Detach from the terminal; stdout/stderr go to the container log.
    pub detach: bool,
    /// Cgroup limits.
    pub resources: ResourceConfig,
    /// Optional `(host, container)` bind-mount pair; the container path is
    /// absolute inside the container.
    pub volume: Option<(PathBuf, PathBuf)>,
    /// Root of the per-container trees.
    pub containers_dir: PathBuf,
    /// Root of the extracted image trees.
    pub images_dir: PathBuf,
}

impl RunConfig {
    /// Creates a foreground run configuration with the default data
    /// directories.
    #[must_use]
    pub fn new(image: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            image: image.into(),
            command,
            detach: false,
            resources: ResourceConfig::default(),
            volume: None,
            containers_dir: PathBuf::from(CONTAINERS_DIR),
            images_dir: PathBuf::from(IMAGES_DIR),
        }
    }
}

/// What a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// The new container's ID.
    pub id: ContainerId,
    /// Exit status for foreground runs; `None` when detached.
    pub status: Option<ExitStatus>,
}

/// Splits a `HOST:CONTAINER` volume specification.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidVolume`] unless the value contains
/// exactly one `:` separating two non-empty paths.
pub fn parse_volume(spec: &str) -> Result<(PathBuf, PathBuf)> {
    let mut parts = spec.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(container), None) if !host.is_empty() && !container.is_empty() => {
            Ok((PathBuf::from(host), PathBuf::from(container)))
        }
        _ => Err(RuntimeError::InvalidVolume(format!(
            "expected HOST:CONTAINER, got {spec:?}"
        ))),
    }
}

/// Launches a container per `cfg`.
///
/// # Errors
///
/// Returns an error if the image is missing, the overlay tree cannot be
/// built, cgroup construction fails, or the spawn fails; in the spawn case
/// the containment hook's diagnostic pipe is drained and logged first.
pub fn run_container(cfg: &RunConfig) -> Result<RunOutcome> {
    cfg.resources.validate()?;

    let (id, rootfs, mount_data) =
        create_container_root(&cfg.images_dir, &cfg.containers_dir, &cfg.image)?;

    let clone_flags = CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWIPC;
    let mut opts = Options::new().clone_with_flags(clone_flags);

    tracing::info!(detach = cfg.detach, "running container");
    // Kept open across the spawn; the child dup2s its own copies.
    let mut log_file = None;
    if cfg.detach {
        let log_path = cfg
            .containers_dir
            .join(id.as_str())
            .join(CONTAINER_LOG_FILENAME);
        let file = create_log_file(&log_path)?;
        opts = opts
            .stdout(StdioAction::UseFd(file.as_raw_fd()))
            .stderr(StdioAction::UseFd(file.as_raw_fd()))
            .detach();
        log_file = Some(file);
    }

    // The container's hostname is its ID.
    let mut mount_hook = MountContainer::new(id.as_str(), &rootfs, mount_data)?;
    if let Some((host, container)) = &cfg.volume {
        if !host.exists() {
            return Err(RuntimeError::InvalidVolume(format!(
                "volume path {} in host doesn't exist",
                host.display()
            )));
        }
        let rebased = rebase_into_rootfs(&rootfs, container);
        mount_hook.set_volume(host, &rebased)?;
    }
    let opts = opts.pre_exec_hook(&mount_hook);

    // Unique cgroup name per container, so concurrent runs never collide.
    let cgroup_mgr = CgroupManager::new(id.as_str(), &cfg.resources)?;

    tracing::info!(command = ?cfg.command, "prepare to run command");
    let mut proc = match Subprocess::spawn(&cfg.command, &opts) {
        Ok(proc) => proc,
        Err(err) => {
            let errc = mount_hook.read_error();
            if errc != MountErrc::Ok {
                tracing::error!(reason = errc.message(), "containment hook failed");
            }
            return Err(err.into());
        }
    };
    drop(log_file);

    if let Err(err) = cgroup_mgr.apply(proc.pid()) {
        if proc.waitable() {
            kill_and_reap(&mut proc);
            return Err(err.into());
        }
        // Detached: the launcher owns only the already-reaped intermediate
        // PID, and the grandchild belongs to init. Limits cannot be
        // attached; the run itself goes on.
        tracing::error!(error = %err, "cannot attach detached container to cgroups");
    }

    let mut info = ContainerInfo {
        id: id.clone(),
        image: cfg.image.clone(),
        command: cfg.command.join(" "),
        create_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        status: ContainerStatus::Running,
        pid: proc.pid(),
    };
    if let Err(err) = state::save_info(&cfg.containers_dir, &info) {
        if proc.waitable() {
            kill_and_reap(&mut proc);
        }
        return Err(err.into());
    }

    if cfg.detach {
        tracing::info!(id = %id, "container detached");
        return Ok(RunOutcome { id, status: None });
    }

    let status = proc.wait()?;
    info.status = ContainerStatus::Stopped;
    if let Err(err) = state::save_info(&cfg.containers_dir, &info) {
        tracing::error!(id = %id, error = %err, "failed to persist stopped status");
    }
    tracing::info!(command = ?cfg.command, ?status, "command completed");
    Ok(RunOutcome {
        id,
        status: Some(status),
    })
}

/// Builds the per-container overlay tree and returns
/// `(id, rootfs, overlay mount data)`.
fn create_container_root(
    images_dir: &Path,
    containers_dir: &Path,
    image: &str,
) -> Result<(ContainerId, PathBuf, String)> {
    let image_root = images_dir.join(image);
    if !image_root.is_dir() {
        return Err(RuntimeError::NotFound {
            kind: "image",
            id: image.to_owned(),
        });
    }

    std::fs::create_dir_all(containers_dir).map_err(|e| RuntimeError::Io {
        path: containers_dir.to_path_buf(),
        source: e,
    })?;

    let id = loop {
        let candidate = ContainerId::generate();
        match std::fs::create_dir(containers_dir.join(candidate.as_str())) {
            Ok(()) => {
                tracing::info!(id = %candidate, "chose container id");
                break candidate;
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!(id = %candidate, "generated container id already in use, trying another");
            }
            Err(err) => {
                return Err(RuntimeError::Io {
                    path: containers_dir.join(candidate.as_str()),
                    source: err,
                });
            }
        }
    };

    let container_dir = containers_dir.join(id.as_str());
    let cow_rw = container_dir.join(COW_RW_DIR);
    let cow_workdir = container_dir.join(COW_WORK_DIR);
    let rootfs = container_dir.join(ROOTFS_DIR);
    for dir in [&cow_rw, &cow_workdir, &rootfs] {
        std::fs::create_dir_all(dir).map_err(|e| RuntimeError::Io {
            path: dir.clone(),
            source: e,
        })?;
    }

    let mount_data = format!(
        "lowerdir={},upperdir={},workdir={}",
        image_root.display(),
        cow_rw.display(),
        cow_workdir.display()
    );
    tracing::info!(
        image_root = %image_root.display(),
        rootfs = %rootfs.display(),
        mount_data,
        "created container root"
    );

    Ok((id, rootfs, mount_data))
}

/// Rebases an absolute in-container path under the rootfs mount point.
fn rebase_into_rootfs(rootfs: &Path, container_path: &Path) -> PathBuf {
    let relative = container_path
        .strip_prefix("/")
        .unwrap_or(container_path);
    rootfs.join(relative)
}

fn create_log_file(path: &Path) -> Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .mode(0o666)
        .custom_flags(libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| RuntimeError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

fn kill_and_reap(proc: &mut Subprocess) {
    // SAFETY: pid refers to our own running child.
    unsafe {
        libc::kill(proc.pid(), libc::SIGKILL);
    }
    if let Err(err) = proc.wait() {
        tracing::error!(error = %err, "failed to reap child after pipeline failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_volume_accepts_host_and_container() {
        let (host, container) = parse_volume("/srv/data:/mnt/data").expect("parse");
        assert_eq!(host, PathBuf::from("/srv/data"));
        assert_eq!(container, PathBuf::from("/mnt/data"));
    }

    #[test]
    fn parse_volume_rejects_malformed_specs() {
        for spec in ["", "noseparator", ":/mnt", "/srv:", "/a:/b:/c"] {
            assert!(
                matches!(parse_volume(spec), Err(RuntimeError::InvalidVolume(_))),
                "spec {spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn rebase_strips_leading_slash() {
        let rootfs = Path::new("/var/lib/lumper/containers/abc/rootfs");
        assert_eq!(
            rebase_into_rootfs(rootfs, Path::new("/mnt/data")),
            PathBuf::from("/var/lib/lumper/containers/abc/rootfs/mnt/data")
        );
        assert_eq!(
            rebase_into_rootfs(rootfs, Path::new("mnt/data")),
            PathBuf::from("/var/lib/lumper/containers/abc/rootfs/mnt/data")
        );
    }

    #[test]
    fn create_container_root_requires_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let images = dir.path().join("images");
        let containers = dir.path().join("containers");
        std::fs::create_dir_all(&images).expect("images dir");

        let err = create_container_root(&images, &containers, "missing").unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound { kind: "image", .. }));
    }

    #[test]
    fn create_container_root_builds_overlay_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let images = dir.path().join("images");
        let containers = dir.path().join("containers");
        std::fs::create_dir_all(images.join("busybox")).expect("image tree");

        let (id, rootfs, mount_data) =
            create_container_root(&images, &containers, "busybox").expect("root");

        let container_dir = containers.join(id.as_str());
        assert!(container_dir.join(COW_RW_DIR).is_dir());
        assert!(container_dir.join(COW_WORK_DIR).is_dir());
        assert_eq!(rootfs, container_dir.join(ROOTFS_DIR));
        assert!(rootfs.is_dir());

        let expected = format!(
            "lowerdir={},upperdir={},workdir={}",
            images.join("busybox").display(),
            container_dir.join(COW_RW_DIR).display(),
            container_dir.join(COW_WORK_DIR).display()
        );
        assert_eq!(mount_data, expected);
    }

    #[test]
    fn create_container_root_generates_distinct_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let images = dir.path().join("images");
        let containers = dir.path().join("containers");
        std::fs::create_dir_all(images.join("busybox")).expect("image tree");

        let (first, _, _) = create_container_root(&images, &containers, "busybox").expect("root");
        let (second, _, _) = create_container_root(&images, &containers, "busybox").expect("root");
        assert_ne!(first, second);
    }

    #[test]
    fn run_rejects_malformed_memory_limit_before_touching_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = RunConfig::new("busybox", vec!["/bin/true".into()]);
        cfg.containers_dir = dir.path().join("containers");
        cfg.images_dir = dir.path().join("images");
        cfg.resources.memory_limit = Some("10x".into());

        let err = run_container(&cfg).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Metadata(LumperError::Config { .. })
        ));
        assert!(!cfg.containers_dir.exists(), "no container tree on bad config");
    }

    #[test]
    fn run_config_defaults_to_system_directories() {
        let cfg = RunConfig::new("busybox", vec!["/bin/true".into()]);
        assert_eq!(cfg.containers_dir, PathBuf::from(CONTAINERS_DIR));
        assert_eq!(cfg.images_dir, PathBuf::from(IMAGES_DIR));
        assert!(!cfg.detach);
        assert!(cfg.resources.is_empty());
    }
}
