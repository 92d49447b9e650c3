//! In-child containment: overlay rootfs, pseudo-filesystems, device nodes,
//! and the pivot into the new root.
//!
//! [`MountContainer`] is a [`PreExecHook`] whose plan — hostname, every
//! mount target, the overlay data string, the device table — is precomputed
//! in the parent and stored as owned C strings. `run()` executes inside the
//! cloned child and touches only those preallocated buffers and the stack:
//! no heap allocation, no locks, no unwinding.
//!
//! Failures are reported twice: `run()` returns the captured `errno` (which
//! the launcher turns into a spawn failure), and the step identifier is
//! written as a fixed-size [`MountErrc`] into the hook's own CLOEXEC pipe
//! for the parent to recover via [`MountContainer::read_error`].

use std::ffi::{CString, NulError};
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::Path;

use thiserror::Error;

use crate::fd::{cloexec_pipe, ScopedFd};
use crate::process::PreExecHook;

/// Directory name the old root is pivoted onto inside the new root.
const OLD_ROOT_NAME: &str = ".old_root";

/// The old root's path as seen after the pivot.
const OLD_ROOT_AFTER_PIVOT: &core::ffi::CStr = c"/.old_root";

/// Fixed size of the stack path buffers used inside the child.
const PATH_BUF_SIZE: usize = 4096;

/// Longest stored path that still leaves room for device names and the
/// NUL terminator in a [`PATH_BUF_SIZE`] buffer.
const MAX_PATH_LEN: usize = PATH_BUF_SIZE - 64;

/// Which containment step failed inside the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MountErrc {
    /// No failure.
    Ok = 0,
    /// `sethostname` failed.
    SetHostname = 1,
    /// Making `/` mount propagation private failed.
    MountPrivate = 2,
    /// Mounting the overlay container root failed.
    MountContainerRoot = 3,
    /// Mounting `/proc` failed.
    MountProc = 4,
    /// Mounting `/sys` failed.
    MountSys = 5,
    /// Mounting `/dev` as tmpfs failed.
    MountDev = 6,
    /// Creating `/dev/pts` failed.
    MkdirDevPts = 7,
    /// Mounting `/dev/pts` as devpts failed.
    MountDevPts = 8,
    /// Creating a stdio symlink under `/dev` failed.
    SymlinkCall = 9,
    /// Creating a device node under `/dev` failed.
    MknodCall = 10,
    /// Creating the in-container volume directory failed.
    MkdirContainerVolume = 11,
    /// Bind-mounting the volume failed.
    MountVolume = 12,
    /// Creating the old-root pivot directory failed.
    MkdirOldRootForPivot = 13,
    /// The `pivot_root` syscall failed.
    SyscallPivotRoot = 14,
    /// `chdir("/")` after the pivot failed.
    ChdirCall = 15,
    /// Detaching the old root failed.
    UnmountOldPivot = 16,
    /// Removing the old-root directory failed.
    RmdirOldPivot = 17,
}

impl MountErrc {
    /// Decodes a raw code read back from the error pipe.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::SetHostname),
            2 => Some(Self::MountPrivate),
            3 => Some(Self::MountContainerRoot),
            4 => Some(Self::MountProc),
            5 => Some(Self::MountSys),
            6 => Some(Self::MountDev),
            7 => Some(Self::MkdirDevPts),
            8 => Some(Self::MountDevPts),
            9 => Some(Self::SymlinkCall),
            10 => Some(Self::MknodCall),
            11 => Some(Self::MkdirContainerVolume),
            12 => Some(Self::MountVolume),
            13 => Some(Self::MkdirOldRootForPivot),
            14 => Some(Self::SyscallPivotRoot),
            15 => Some(Self::ChdirCall),
            16 => Some(Self::UnmountOldPivot),
            17 => Some(Self::RmdirOldPivot),
            _ => None,
        }
    }

    /// Human-readable description of the failed step.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::SetHostname => "failed to set container hostname",
            Self::MountPrivate => "failed to mount for private namespace",
            Self::MountContainerRoot => "failed to mount container root",
            Self::MountProc => "failed to mount /proc as proc",
            Self::MountSys => "failed to mount /sys as sysfs",
            Self::MountDev => "failed to mount /dev as tmpfs",
            Self::MkdirDevPts => "failed to mkdir /dev/pts",
            Self::MountDevPts => "failed to mount /dev/pts as devpts",
            Self::SymlinkCall => "failed to create symlink in /dev",
            Self::MknodCall => "failed to create device node in /dev",
            Self::MkdirContainerVolume => "failed to mkdir container volume",
            Self::MountVolume => "failed to mount volume",
            Self::MkdirOldRootForPivot => "failed to mkdir old root for pivot",
            Self::SyscallPivotRoot => "failed to call syscall pivot_root",
            Self::ChdirCall => "failed to chdir to new root",
            Self::UnmountOldPivot => "failed to unmount old root",
            Self::RmdirOldPivot => "failed to rmdir old root",
        }
    }
}

/// Errors from building the mount plan in the parent.
#[derive(Debug, Error)]
pub enum HookSetupError {
    /// A precondition on the plan was violated.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A path or hostname contained an interior NUL byte.
    #[error("path contains NUL byte: {0}")]
    Nul(#[from] NulError),

    /// The hook's error pipe could not be created.
    #[error("failed to create hook error pipe: {0}")]
    Pipe(#[source] io::Error),
}

struct DeviceNode {
    /// NUL-terminated node name.
    name: &'static [u8],
    major: libc::c_uint,
    minor: libc::c_uint,
}

/// Character devices created under `/dev`, all mode 0666.
const SPECIAL_DEVICES: [DeviceNode; 7] = [
    DeviceNode { name: b"null\0", major: 1, minor: 3 },
    DeviceNode { name: b"zero\0", major: 1, minor: 5 },
    DeviceNode { name: b"random\0", major: 1, minor: 8 },
    DeviceNode { name: b"urandom\0", major: 1, minor: 9 },
    DeviceNode { name: b"tty\0", major: 5, minor: 0 },
    DeviceNode { name: b"console\0", major: 136, minor: 1 },
    DeviceNode { name: b"full\0", major: 1, minor: 7 },
];

/// NUL-terminated names of the stdio symlinks, in fd order.
const STDIO_LINKS: [&[u8]; 3] = [b"stdin\0", b"stdout\0", b"stderr\0"];

/// Pre-exec hook that moves the child into its container root.
///
/// The sequence is fixed: set hostname, detach mount propagation, stack the
/// overlay rootfs, mount `/proc`, `/sys`, `/dev` (+ `devpts`), populate
/// `/dev`, optionally bind-mount a host volume, then pivot into the new
/// root. The pivot is deferred to the end because the earlier steps address
/// their targets through `new_root/…` paths that become invalid post-pivot.
#[derive(Debug)]
pub struct MountContainer {
    hostname: CString,
    new_root: CString,
    old_root: CString,
    new_proc: CString,
    new_sys: CString,
    new_dev: CString,
    new_dev_pts: CString,
    mount_data: CString,
    volume: Option<(CString, CString)>,
    err_pipe_rd: ScopedFd,
    err_pipe_wr: ScopedFd,
}

impl MountContainer {
    /// Builds the mount plan. Runs in the parent; this is the only place
    /// the hook allocates.
    ///
    /// `mount_data` is the overlay option string
    /// `"lowerdir=…,upperdir=…,workdir=…"`.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount_data` is empty, a path is too long or
    /// contains a NUL byte, or the error pipe cannot be created.
    pub fn new(hostname: &str, new_root: &Path, mount_data: String) -> Result<Self, HookSetupError> {
        if mount_data.is_empty() {
            return Err(HookSetupError::InvalidArgument("empty overlay mount data"));
        }
        if new_root.as_os_str().len() > MAX_PATH_LEN {
            return Err(HookSetupError::InvalidArgument("container root path too long"));
        }

        let to_cstring =
            |path: std::path::PathBuf| CString::new(path.into_os_string().into_vec());

        let (err_pipe_rd, err_pipe_wr) = cloexec_pipe().map_err(HookSetupError::Pipe)?;

        Ok(Self {
            hostname: CString::new(hostname)?,
            new_root: to_cstring(new_root.to_path_buf())?,
            old_root: to_cstring(new_root.join(OLD_ROOT_NAME))?,
            new_proc: to_cstring(new_root.join("proc"))?,
            new_sys: to_cstring(new_root.join("sys"))?,
            new_dev: to_cstring(new_root.join("dev"))?,
            new_dev_pts: to_cstring(new_root.join("dev/pts"))?,
            mount_data: CString::new(mount_data)?,
            volume: None,
            err_pipe_rd,
            err_pipe_wr,
        })
    }

    /// Registers a host directory to bind-mount at `container_path` (an
    /// absolute path inside the rootfs, already rebased by the caller).
    ///
    /// # Errors
    ///
    /// Returns an error if a path is too long or contains a NUL byte.
    pub fn set_volume(&mut self, host_path: &Path, container_path: &Path) -> Result<(), HookSetupError> {
        if container_path.as_os_str().len() > MAX_PATH_LEN {
            return Err(HookSetupError::InvalidArgument("volume path too long"));
        }
        tracing::info!(
            host = %host_path.display(),
            container = %container_path.display(),
            "configured data volume"
        );
        self.volume = Some((
            CString::new(host_path.as_os_str().to_os_string().into_vec())?,
            CString::new(container_path.as_os_str().to_os_string().into_vec())?,
        ));
        Ok(())
    }

    /// Recovers the step code a failed `run()` wrote into the hook's pipe.
    ///
    /// Closes the parent's write end first so the read sees EOF (and
    /// returns [`MountErrc::Ok`]) when the child never reported anything.
    pub fn read_error(&mut self) -> MountErrc {
        self.err_pipe_wr.release();
        let mut buf = [0u8; 4];
        let rc = loop {
            // SAFETY: buf is a valid writable 4-byte buffer.
            let rc = unsafe {
                libc::read(self.err_pipe_rd.get(), buf.as_mut_ptr().cast(), buf.len())
            };
            if rc == -1 && last_errno() == libc::EINTR {
                continue;
            }
            break rc;
        };
        if rc != buf.len() as isize {
            if rc != 0 {
                tracing::error!(rc, "short read from mount hook error pipe");
            }
            return MountErrc::Ok;
        }
        let raw = u32::from_ne_bytes(buf);
        MountErrc::from_raw(raw).unwrap_or_else(|| {
            tracing::error!(raw, "unrecognized mount hook error code");
            MountErrc::Ok
        })
    }

    fn make_contained(&self) -> MountErrc {
        // SAFETY: hostname is a valid NUL-terminated buffer owned by self.
        let rv = unsafe {
            libc::sethostname(self.hostname.as_ptr(), self.hostname.as_bytes().len())
        };
        if rv != 0 {
            return MountErrc::SetHostname;
        }

        // MS_REC applies recursively; without this, every mount below would
        // propagate to the host's mount namespace.
        // SAFETY: all strings are valid NUL-terminated buffers.
        let rv = unsafe {
            libc::mount(
                c"".as_ptr(),
                c"/".as_ptr(),
                c"".as_ptr(),
                libc::MS_PRIVATE | libc::MS_REC,
                c"".as_ptr().cast(),
            )
        };
        if rv != 0 {
            return MountErrc::MountPrivate;
        }

        let errc = self.setup_container_root();
        if errc != MountErrc::Ok {
            return errc;
        }

        let errc = self.create_mounts();
        if errc != MountErrc::Ok {
            return errc;
        }

        self.change_root()
    }

    fn setup_container_root(&self) -> MountErrc {
        // SAFETY: all strings are valid NUL-terminated buffers owned by self.
        let rv = unsafe {
            libc::mount(
                c"overlay".as_ptr(),
                self.new_root.as_ptr(),
                c"overlay".as_ptr(),
                libc::MS_NODEV,
                self.mount_data.as_ptr().cast(),
            )
        };
        if rv != 0 {
            return MountErrc::MountContainerRoot;
        }
        MountErrc::Ok
    }

    fn create_mounts(&self) -> MountErrc {
        // SAFETY: all strings are valid NUL-terminated buffers owned by self.
        unsafe {
            if libc::mount(
                c"proc".as_ptr(),
                self.new_proc.as_ptr(),
                c"proc".as_ptr(),
                0,
                c"".as_ptr().cast(),
            ) != 0
            {
                return MountErrc::MountProc;
            }

            if libc::mount(
                c"sysfs".as_ptr(),
                self.new_sys.as_ptr(),
                c"sysfs".as_ptr(),
                0,
                c"".as_ptr().cast(),
            ) != 0
            {
                return MountErrc::MountSys;
            }

            let dev_flags = libc::MS_NOSUID | libc::MS_STRICTATIME;
            if libc::mount(
                c"tmpfs".as_ptr(),
                self.new_dev.as_ptr(),
                c"tmpfs".as_ptr(),
                dev_flags,
                c"mode=755".as_ptr().cast(),
            ) != 0
            {
                return MountErrc::MountDev;
            }

            if create_directories(self.new_dev_pts.to_bytes()) != 0 {
                return MountErrc::MkdirDevPts;
            }

            if libc::mount(
                c"devpts".as_ptr(),
                self.new_dev_pts.as_ptr(),
                c"devpts".as_ptr(),
                0,
                c"".as_ptr().cast(),
            ) != 0
            {
                return MountErrc::MountDevPts;
            }
        }

        let errc = self.make_devices();
        if errc != MountErrc::Ok {
            return errc;
        }

        if let Some((in_host, in_container)) = &self.volume {
            if create_directories(in_container.to_bytes()) != 0 {
                return MountErrc::MkdirContainerVolume;
            }
            // SAFETY: both paths are valid NUL-terminated buffers.
            let rv = unsafe {
                libc::mount(
                    in_host.as_ptr(),
                    in_container.as_ptr(),
                    c"bind".as_ptr(),
                    libc::MS_BIND | libc::MS_REC,
                    c"".as_ptr().cast(),
                )
            };
            if rv != 0 {
                return MountErrc::MountVolume;
            }
        }

        MountErrc::Ok
    }

    fn make_devices(&self) -> MountErrc {
        let mut dev_path_buf = [0u8; PATH_BUF_SIZE];
        let dev = self.new_dev.to_bytes();
        dev_path_buf[..dev.len()].copy_from_slice(dev);
        let mut prefix_len = dev.len();
        if dev.last() != Some(&b'/') {
            dev_path_buf[prefix_len] = b'/';
            prefix_len += 1;
        }

        // Stdio symlinks: /dev/{stdin,stdout,stderr} -> /proc/self/fd/{0,1,2}.
        let mut self_fd_path = *b"/proc/self/fd/0\0";
        let digit_at = self_fd_path.len() - 2;
        for (i, name) in STDIO_LINKS.iter().enumerate() {
            self_fd_path[digit_at] = b'0' + i as u8;
            dev_path_buf[prefix_len..prefix_len + name.len()].copy_from_slice(name);
            // SAFETY: both buffers are NUL-terminated stack arrays.
            if unsafe { libc::symlink(self_fd_path.as_ptr().cast(), dev_path_buf.as_ptr().cast()) }
                != 0
            {
                return MountErrc::SymlinkCall;
            }
        }

        // /dev/fd -> /proc/self/fd: truncate at the trailing slash.
        self_fd_path[digit_at - 1] = 0;
        let fd_name = b"fd\0";
        dev_path_buf[prefix_len..prefix_len + fd_name.len()].copy_from_slice(fd_name);
        // SAFETY: both buffers are NUL-terminated stack arrays.
        if unsafe { libc::symlink(self_fd_path.as_ptr().cast(), dev_path_buf.as_ptr().cast()) } != 0
        {
            return MountErrc::SymlinkCall;
        }

        for dev_node in &SPECIAL_DEVICES {
            dev_path_buf[prefix_len..prefix_len + dev_node.name.len()]
                .copy_from_slice(dev_node.name);
            let dev_num = libc::makedev(dev_node.major, dev_node.minor);
            // SAFETY: the path is a NUL-terminated stack buffer.
            let rv = unsafe {
                libc::mknod(dev_path_buf.as_ptr().cast(), libc::S_IFCHR | 0o666, dev_num)
            };
            if rv != 0 {
                return MountErrc::MknodCall;
            }
        }

        MountErrc::Ok
    }

    fn change_root(&self) -> MountErrc {
        // SAFETY: all paths are valid NUL-terminated buffers owned by self.
        unsafe {
            if libc::mkdir(self.old_root.as_ptr(), 0o777) != 0 {
                return MountErrc::MkdirOldRootForPivot;
            }

            // Root moves to new_root; the old root is attached at old_root.
            if libc::syscall(
                libc::SYS_pivot_root,
                self.new_root.as_ptr(),
                self.old_root.as_ptr(),
            ) != 0
            {
                return MountErrc::SyscallPivotRoot;
            }

            if libc::chdir(c"/".as_ptr()) != 0 {
                return MountErrc::ChdirCall;
            }

            if libc::umount2(OLD_ROOT_AFTER_PIVOT.as_ptr(), libc::MNT_DETACH) != 0 {
                return MountErrc::UnmountOldPivot;
            }

            if libc::rmdir(OLD_ROOT_AFTER_PIVOT.as_ptr()) != 0 {
                return MountErrc::RmdirOldPivot;
            }
        }

        MountErrc::Ok
    }
}

impl PreExecHook for MountContainer {
    /// Runs the containment sequence in the child. No heap allocation is
    /// allowed in this function or anything it calls.
    fn run(&self) -> i32 {
        let errc = self.make_contained();
        if errc != MountErrc::Ok {
            let errno_value = last_errno();
            let buf = (errc as u32).to_ne_bytes();
            loop {
                // SAFETY: buf is a valid 4-byte stack buffer.
                let wc = unsafe {
                    libc::write(self.err_pipe_wr.get(), buf.as_ptr().cast(), buf.len())
                };
                if wc == -1 && last_errno() == libc::EINTR {
                    continue;
                }
                break;
            }
            return errno_value;
        }
        0
    }
}

/// `mkdir -p` without heap allocation: the path is copied into a fixed
/// stack buffer which is NUL-terminated in place at each `/` boundary.
///
/// Returns 0 on success or the failing `errno`. `EEXIST` is tolerated.
fn create_directories(path: &[u8]) -> i32 {
    if path.len() >= PATH_BUF_SIZE {
        return libc::ENAMETOOLONG;
    }
    let mut buf = [0u8; PATH_BUF_SIZE];
    buf[..path.len()].copy_from_slice(path);

    let mut i = 0;
    while i < path.len() {
        while i < path.len() && buf[i] != b'/' {
            i += 1;
        }

        // Skip the leading slash of an absolute path.
        if i == 0 {
            i += 1;
            continue;
        }

        if i < path.len() {
            buf[i] = 0;
        }

        // SAFETY: buf is NUL-terminated at or before index path.len().
        if unsafe { libc::mkdir(buf.as_ptr().cast(), 0o777) } != 0 {
            let errno = last_errno();
            if errno != libc::EEXIST {
                return errno;
            }
        }

        if i < path.len() {
            buf[i] = b'/';
            i += 1;
        }
    }

    0
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}
