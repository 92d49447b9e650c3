//! Subprocess launcher built on raw `clone(2)`.
//!
//! [`Subprocess::spawn`] clones a child with the configured namespace flags,
//! wires stdio, runs an injected pre-exec hook, and executes the target
//! program. Child-side failures are conveyed to the parent through a CLOEXEC
//! error pipe as a fixed-size [`ChildErrorInfo`] record: a successful `exec`
//! closes the child's write end, so a zero-length read in the parent means
//! success.
//!
//! Between `clone` and `exec` the child must not allocate heap, acquire
//! locks, or unwind. Everything the child touches — argv pointer array,
//! resolved stdio descriptors, the error-pipe fd — is prepared in the parent
//! before the clone.

use std::ffi::CString;
use std::io;
use std::os::raw::c_char;
use std::os::unix::io::RawFd;

use nix::sched::CloneFlags;
use thiserror::Error;

use crate::fd::{cloexec_pipe, ScopedFd};

/// A hook executed in the child after stdio setup and before `exec`.
///
/// `run` returns 0 on success or an errno-like code on failure; a non-zero
/// return is reported to the parent as a
/// [`ChildErrc::RunPreExecCallback`] spawn failure. Implementations must not
/// allocate, lock, or unwind: they run in a forked-but-not-yet-exec'd child.
pub trait PreExecHook {
    /// Runs the hook in the child. Must be async-signal-safe.
    fn run(&self) -> i32;
}

/// What to do with one of the child's standard descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioAction {
    /// Leave the descriptor as inherited from the parent.
    Inherit,
    /// Redirect to `/dev/null`, opened for reading on stdin and writing on
    /// stdout/stderr.
    Null,
    /// `dup2` an existing descriptor onto the slot.
    UseFd(RawFd),
    /// Create a pipe; the parent end is retained on the [`Subprocess`]
    /// handle, the child end is `dup2`'d onto the slot.
    Pipe,
}

/// Launch configuration for [`Subprocess::spawn`].
pub struct Options<'a> {
    clone_flags: CloneFlags,
    actions: [StdioAction; 3],
    detach: bool,
    pre_exec_hook: Option<&'a dyn PreExecHook>,
}

impl Default for Options<'_> {
    fn default() -> Self {
        Self {
            clone_flags: CloneFlags::empty(),
            actions: [StdioAction::Inherit; 3],
            detach: false,
            pre_exec_hook: None,
        }
    }
}

impl<'a> Options<'a> {
    /// Creates options with no namespace flags and all stdio inherited.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace flags for the clone. The child-termination signal
    /// (`SIGCHLD`) is added unconditionally at spawn time.
    #[must_use]
    pub fn clone_with_flags(mut self, flags: CloneFlags) -> Self {
        self.clone_flags = flags;
        self
    }

    /// Configures the child's stdin.
    #[must_use]
    pub fn stdin(mut self, action: StdioAction) -> Self {
        self.actions[0] = action;
        self
    }

    /// Configures the child's stdout.
    #[must_use]
    pub fn stdout(mut self, action: StdioAction) -> Self {
        self.actions[1] = action;
        self
    }

    /// Configures the child's stderr.
    #[must_use]
    pub fn stderr(mut self, action: StdioAction) -> Self {
        self.actions[2] = action;
        self
    }

    /// Requests a double-clone so the target process is reparented to init;
    /// the intermediate child is reaped by `spawn` itself.
    #[must_use]
    pub fn detach(mut self) -> Self {
        self.detach = true;
        self
    }

    /// Installs a hook to run in the child before `exec`.
    #[must_use]
    pub fn pre_exec_hook(mut self, hook: &'a dyn PreExecHook) -> Self {
        self.pre_exec_hook = Some(hook);
        self
    }
}

/// How the child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with the given code (0..=255).
    Exited(i32),
    /// Terminated by the given signal.
    Killed(i32),
}

impl ExitStatus {
    /// Interprets a raw `waitpid` status.
    ///
    /// A status that is neither exited nor signaled is a fatal internal
    /// error and aborts the process.
    fn from_wait_status(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self::Exited(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            Self::Killed(libc::WTERMSIG(status))
        } else {
            tracing::error!(status, "wait status is neither exited nor signaled");
            std::process::abort();
        }
    }

    /// Returns true for a normal exit with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// Where in the child the spawn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChildErrc {
    /// No failure.
    Success = 0,
    /// A stdio `dup2`/`open` failed.
    PrepareStdio = 1,
    /// The injected pre-exec hook returned non-zero.
    RunPreExecCallback = 2,
    /// `execvp` itself failed.
    ExecCallFailure = 3,
    /// The second clone of a detached spawn failed.
    DetachCloneFailure = 4,
}

impl ChildErrc {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Success),
            1 => Some(Self::PrepareStdio),
            2 => Some(Self::RunPreExecCallback),
            3 => Some(Self::ExecCallFailure),
            4 => Some(Self::DetachCloneFailure),
            _ => None,
        }
    }

    /// Human-readable description of the failure site.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PrepareStdio => "failed to prepare stdio fd",
            Self::RunPreExecCallback => "failed to run pre-exec callback",
            Self::ExecCallFailure => "failed to call exec",
            Self::DetachCloneFailure => "failed to clone for detach",
        }
    }
}

/// The fixed-size record a failing child writes into the error pipe.
///
/// Writes of at most `PIPE_BUF` bytes on a blocking pipe are atomic on
/// Linux, so once a write of this 8-byte record completes no short write
/// can have happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ChildErrorInfo {
    err_code: u32,
    errno_value: i32,
}

impl ChildErrorInfo {
    const SIZE: usize = 8;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..4].copy_from_slice(&self.err_code.to_ne_bytes());
        buf[4..].copy_from_slice(&self.errno_value.to_ne_bytes());
        buf
    }

    fn from_bytes(buf: [u8; Self::SIZE]) -> Self {
        Self {
            err_code: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            errno_value: i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

const _: () = assert!(std::mem::size_of::<ChildErrorInfo>() == ChildErrorInfo::SIZE);

/// Errors raised by [`Subprocess::spawn`] and [`Subprocess::wait`].
#[derive(Debug, Error)]
pub enum SpawnError {
    /// A precondition on the caller's arguments was violated.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A parent-side syscall failed.
    #[error("failed to {what}: {source}")]
    Sys {
        /// The syscall that failed.
        what: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The child reported a failure through the error pipe before `exec`
    /// completed; the child has already been reaped.
    #[error("cannot spawn {exe}: {}; errno={errno}", kind.message())]
    Child {
        /// The executable that was being spawned.
        exe: String,
        /// Where in the child the failure occurred.
        kind: ChildErrc,
        /// The errno (or hook return code) captured in the child.
        errno: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    Running,
    Exited,
}

/// Stdio action with all descriptors resolved, safe to apply in the child.
#[derive(Clone, Copy)]
enum PreparedStdio {
    Inherit,
    Null { open_flags: libc::c_int },
    Dup { fd: RawFd },
}

/// A running (or reaped) child process.
///
/// State machine: `NotStarted → Running → Exited`, no backward transitions.
/// While `Running` the caller owes exactly one [`wait`](Self::wait);
/// dropping a running handle is a programmer error and aborts the process.
#[derive(Debug)]
pub struct Subprocess {
    state: State,
    pid: libc::pid_t,
    stdio_pipes: [ScopedFd; 3],
}

impl Subprocess {
    /// Spawns `argv` as a child process under `opts`.
    ///
    /// On success the handle is running (or already reaped, for detached
    /// spawns) and any stdio slot configured as [`StdioAction::Pipe`] has
    /// its parent end available through the pipe accessors.
    ///
    /// # Errors
    ///
    /// - [`SpawnError::InvalidArgument`] if `argv` is empty or contains an
    ///   interior NUL byte; no clone is performed.
    /// - [`SpawnError::Sys`] if a parent-side syscall fails.
    /// - [`SpawnError::Child`] if the child reported a pre-exec failure;
    ///   the child has been reaped before this is returned.
    pub fn spawn(argv: &[String], opts: &Options<'_>) -> Result<Self, SpawnError> {
        if argv.is_empty() {
            return Err(SpawnError::InvalidArgument("argv cannot be empty"));
        }
        let c_argv = argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SpawnError::InvalidArgument("argv cannot contain NUL bytes"))?;
        let mut argv_ptrs: Vec<*const c_char> = c_argv.iter().map(|s| s.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let mut proc = Self {
            state: State::NotStarted,
            pid: -1,
            stdio_pipes: Default::default(),
        };

        // Child-side pipe ends live here so they stay open across the
        // clone; the kernel closes the inherited copies at exec (CLOEXEC).
        let mut child_ends: [ScopedFd; 3] = Default::default();
        let mut prepared = [PreparedStdio::Inherit; 3];
        for (slot, action) in opts.actions.iter().enumerate() {
            prepared[slot] = match *action {
                StdioAction::Inherit => PreparedStdio::Inherit,
                StdioAction::Null => PreparedStdio::Null {
                    open_flags: libc::O_CLOEXEC
                        | if slot == 0 { libc::O_RDONLY } else { libc::O_WRONLY },
                },
                StdioAction::UseFd(fd) => PreparedStdio::Dup { fd },
                StdioAction::Pipe => {
                    let (rd, wr) = cloexec_pipe().map_err(|e| SpawnError::Sys {
                        what: "pipe2",
                        source: e,
                    })?;
                    if slot == 0 {
                        proc.stdio_pipes[0] = wr;
                        child_ends[0] = rd;
                    } else {
                        proc.stdio_pipes[slot] = rd;
                        child_ends[slot] = wr;
                    }
                    PreparedStdio::Dup {
                        fd: child_ends[slot].get(),
                    }
                }
            };
        }

        let (err_rd, mut err_wr) = cloexec_pipe().map_err(|e| SpawnError::Sys {
            what: "pipe2",
            source: e,
        })?;

        let flags = opts.clone_flags.bits() as u64 | libc::SIGCHLD as u64;
        let pid = raw_clone(flags);
        if pid < 0 {
            return Err(SpawnError::Sys {
                what: "clone",
                source: io::Error::last_os_error(),
            });
        }
        if pid == 0 {
            // SAFETY: we are the freshly cloned child; every pointer and
            // descriptor was prepared before the clone and the path below
            // performs no allocation.
            unsafe { child_after_clone(&argv_ptrs, &prepared, opts, err_wr.get()) }
        }

        proc.pid = pid as libc::pid_t;
        proc.state = State::Running;

        drop(child_ends);
        // Close our write end before reading. A successful exec closes the
        // child's copy via CLOEXEC and the read below must then see EOF;
        // keeping our end open would block it forever.
        err_wr.release();
        proc.read_child_error_pipe(err_rd.get(), &argv[0])?;

        if opts.detach {
            // The intermediate child of the double-clone exits immediately;
            // reap it so the caller owes no wait on this handle.
            let status = proc.wait()?;
            if !status.success() {
                tracing::warn!(?status, "detach intermediate child exited abnormally");
            }
        }

        Ok(proc)
    }

    /// Blocks until the child exits and returns its status.
    ///
    /// Restarts on `EINTR`. A `waitpid` result with an unexpected PID is
    /// logged but not treated as a failure.
    ///
    /// # Errors
    ///
    /// - [`SpawnError::InvalidArgument`] if the handle is not running.
    /// - [`SpawnError::Sys`] if `waitpid` fails; no further wait is owed on
    ///   this handle afterwards.
    pub fn wait(&mut self) -> Result<ExitStatus, SpawnError> {
        if self.state != State::Running {
            return Err(SpawnError::InvalidArgument("subprocess is not running"));
        }
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: status points at a valid c_int.
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc == -1 {
                if last_errno() == libc::EINTR {
                    continue;
                }
                self.state = State::Exited;
                return Err(SpawnError::Sys {
                    what: "waitpid",
                    source: io::Error::last_os_error(),
                });
            }
            if rc != self.pid {
                tracing::warn!(expected = self.pid, returned = rc, "waitpid pid mismatch");
            }
            break;
        }
        self.state = State::Exited;
        Ok(ExitStatus::from_wait_status(status))
    }

    /// Returns true while the caller still owes a [`wait`](Self::wait).
    #[must_use]
    pub fn waitable(&self) -> bool {
        self.state == State::Running
    }

    /// The child PID. Only meaningful while the handle is running.
    #[must_use]
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Parent end of the stdin pipe, or -1 if stdin was not piped.
    #[must_use]
    pub fn stdin_pipe(&self) -> RawFd {
        self.stdio_pipes[0].get()
    }

    /// Parent end of the stdout pipe, or -1 if stdout was not piped.
    #[must_use]
    pub fn stdout_pipe(&self) -> RawFd {
        self.stdio_pipes[1].get()
    }

    /// Parent end of the stderr pipe, or -1 if stderr was not piped.
    #[must_use]
    pub fn stderr_pipe(&self) -> RawFd {
        self.stdio_pipes[2].get()
    }

    /// Transfers ownership of the stdin pipe end off the handle, so the
    /// caller can close it and deliver EOF to the child.
    #[must_use]
    pub fn take_stdin_pipe(&mut self) -> ScopedFd {
        std::mem::take(&mut self.stdio_pipes[0])
    }

    fn read_child_error_pipe(&mut self, err_fd: RawFd, exe: &str) -> Result<(), SpawnError> {
        let mut buf = [0u8; ChildErrorInfo::SIZE];
        let rc = loop {
            // SAFETY: buf is a valid writable buffer of the given length.
            let rc = unsafe { libc::read(err_fd, buf.as_mut_ptr().cast(), buf.len()) };
            if rc == -1 && last_errno() == libc::EINTR {
                continue;
            }
            break rc;
        };

        // Child exec'd successfully: its CLOEXEC write end was closed.
        if rc == 0 {
            return Ok(());
        }

        // Read failure or partial read: the child is beyond our knowledge
        // at this point, pretend it succeeded.
        if rc != ChildErrorInfo::SIZE as isize {
            tracing::error!(
                rc,
                errno = last_errno(),
                "failed to read from child error pipe; assuming child succeeded"
            );
            return Ok(());
        }

        let info = ChildErrorInfo::from_bytes(buf);
        let Some(kind) = ChildErrc::from_raw(info.err_code) else {
            tracing::error!(code = info.err_code, "unrecognized child error code");
            return Ok(());
        };

        // The child is certainly failing: reap it before reporting.
        if let Err(err) = self.wait() {
            tracing::error!(error = %err, "failed to reap child after spawn failure");
        }
        Err(SpawnError::Child {
            exe: exe.to_owned(),
            kind,
            errno: info.errno_value,
        })
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        if self.state == State::Running {
            tracing::error!(
                pid = self.pid,
                "dropping a running subprocess without wait(); aborting"
            );
            std::process::abort();
        }
    }
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}

/// Fork-like clone: no new stack, no TLS or tid pointers.
fn raw_clone(flags: u64) -> libc::c_long {
    // SAFETY: a null child stack makes clone behave like fork; the unused
    // tid/tls arguments are null.
    unsafe { libc::syscall(libc::SYS_clone, flags, 0usize, 0usize, 0usize, 0usize) }
}

/// The child's path from clone to exec. Never returns.
///
/// # Safety
///
/// Must only be called in the freshly cloned child. All referenced data was
/// prepared in the parent; nothing here allocates, locks, or unwinds.
unsafe fn child_after_clone(
    argv: &[*const c_char],
    prepared: &[PreparedStdio; 3],
    opts: &Options<'_>,
    err_fd: RawFd,
) -> ! {
    if opts.detach {
        let pid = raw_clone(libc::SIGCHLD as u64);
        if pid < 0 {
            notify_child_error(err_fd, ChildErrc::DetachCloneFailure, last_errno());
        }
        if pid > 0 {
            // Intermediate child: the grandchild is now owned by init.
            libc::_exit(0);
        }
    }

    for (slot, action) in prepared.iter().enumerate() {
        let rv = match *action {
            PreparedStdio::Inherit => 0,
            PreparedStdio::Dup { fd } => libc::dup2(fd, slot as RawFd),
            PreparedStdio::Null { open_flags } => {
                let fd = libc::open(c"/dev/null".as_ptr(), open_flags);
                if fd == -1 {
                    -1
                } else {
                    let rv = libc::dup2(fd, slot as RawFd);
                    libc::close(fd);
                    rv
                }
            }
        };
        if rv == -1 {
            notify_child_error(err_fd, ChildErrc::PrepareStdio, last_errno());
        }
    }

    if let Some(hook) = opts.pre_exec_hook {
        let rc = hook.run();
        if rc != 0 {
            notify_child_error(err_fd, ChildErrc::RunPreExecCallback, rc);
        }
    }

    libc::execvp(argv[0], argv.as_ptr());
    // Reaching this line means exec failed.
    notify_child_error(err_fd, ChildErrc::ExecCallFailure, last_errno());
}

/// Writes the error record into the pipe and exits the child.
///
/// The 8-byte write on a blocking pipe is atomic, so the parent either
/// reads the whole record or nothing.
fn notify_child_error(err_fd: RawFd, errc: ChildErrc, errno_value: i32) -> ! {
    let info = ChildErrorInfo {
        err_code: errc as u32,
        errno_value,
    };
    let buf = info.to_bytes();
    loop {
        // SAFETY: buf is a valid buffer of the given length.
        let wc = unsafe { libc::write(err_fd, buf.as_ptr().cast(), buf.len()) };
        if wc == -1 && last_errno() == libc::EINTR {
            continue;
        }
        break;
    }
    // SAFETY: terminating the child without running atexit handlers or
    // unwinding is exactly what is required here.
    unsafe { libc::_exit(errc as i32) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    fn read_all(fd: RawFd) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            // SAFETY: buf is a valid writable buffer.
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            assert!(n >= 0, "read failed");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n as usize]);
        }
        out
    }

    #[test]
    fn error_info_roundtrips_byte_exactly() {
        let info = ChildErrorInfo {
            err_code: ChildErrc::ExecCallFailure as u32,
            errno_value: libc::ENOENT,
        };
        assert_eq!(ChildErrorInfo::from_bytes(info.to_bytes()), info);

        let negative = ChildErrorInfo {
            err_code: ChildErrc::RunPreExecCallback as u32,
            errno_value: -1,
        };
        assert_eq!(ChildErrorInfo::from_bytes(negative.to_bytes()), negative);
    }

    #[test]
    fn child_errc_raw_roundtrip() {
        for kind in [
            ChildErrc::Success,
            ChildErrc::PrepareStdio,
            ChildErrc::RunPreExecCallback,
            ChildErrc::ExecCallFailure,
            ChildErrc::DetachCloneFailure,
        ] {
            assert_eq!(ChildErrc::from_raw(kind as u32), Some(kind));
        }
        assert_eq!(ChildErrc::from_raw(99), None);
    }

    #[test]
    fn spawn_empty_argv_is_invalid_argument() {
        let err = Subprocess::spawn(&[], &Options::new()).unwrap_err();
        assert!(matches!(err, SpawnError::InvalidArgument(_)));
    }

    #[test]
    fn spawn_true_exits_zero() {
        let mut proc = Subprocess::spawn(&args(&["/bin/true"]), &Options::new()).expect("spawn");
        assert!(proc.waitable());
        assert!(proc.pid() > 0);
        let status = proc.wait().expect("wait");
        assert_eq!(status, ExitStatus::Exited(0));
        assert!(!proc.waitable());
    }

    #[test]
    fn spawn_false_exits_one() {
        let mut proc = Subprocess::spawn(&args(&["/bin/false"]), &Options::new()).expect("spawn");
        let status = proc.wait().expect("wait");
        assert_eq!(status, ExitStatus::Exited(1));
    }

    #[test]
    fn spawn_missing_executable_reports_exec_failure() {
        let err = Subprocess::spawn(&args(&["/does/not/exist"]), &Options::new()).unwrap_err();
        match err {
            SpawnError::Child { kind, errno, .. } => {
                assert_eq!(kind, ChildErrc::ExecCallFailure);
                assert_eq!(errno, libc::ENOENT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn double_wait_is_invalid_argument() {
        let mut proc = Subprocess::spawn(&args(&["/bin/true"]), &Options::new()).expect("spawn");
        proc.wait().expect("first wait");
        assert!(matches!(
            proc.wait(),
            Err(SpawnError::InvalidArgument(_))
        ));
    }

    #[test]
    fn stdout_pipe_carries_child_output() {
        let opts = Options::new().stdout(StdioAction::Pipe);
        let mut proc =
            Subprocess::spawn(&args(&["/bin/sh", "-c", "echo hi"]), &opts).expect("spawn");
        assert!(proc.stdout_pipe() != -1);
        assert_eq!(proc.stdin_pipe(), -1);

        let out = read_all(proc.stdout_pipe());
        assert_eq!(out, b"hi\n");
        assert_eq!(proc.wait().expect("wait"), ExitStatus::Exited(0));
    }

    #[test]
    fn stdin_pipe_feeds_child_input() {
        let opts = Options::new()
            .stdin(StdioAction::Pipe)
            .stdout(StdioAction::Pipe);
        let mut proc = Subprocess::spawn(&args(&["/bin/cat"]), &opts).expect("spawn");

        let msg = b"over the pipe\n";
        // SAFETY: msg is a valid buffer.
        let wc = unsafe { libc::write(proc.stdin_pipe(), msg.as_ptr().cast(), msg.len()) };
        assert_eq!(wc, msg.len() as isize);
        // Deliver EOF so cat terminates.
        drop(proc.take_stdin_pipe());

        let out = read_all(proc.stdout_pipe());
        assert_eq!(out, msg);
        assert_eq!(proc.wait().expect("wait"), ExitStatus::Exited(0));
    }

    #[test]
    fn stderr_pipe_carries_diagnostics() {
        let opts = Options::new().stderr(StdioAction::Pipe);
        let mut proc =
            Subprocess::spawn(&args(&["/bin/sh", "-c", "echo oops >&2"]), &opts).expect("spawn");
        let out = read_all(proc.stderr_pipe());
        assert_eq!(out, b"oops\n");
        proc.wait().expect("wait");
    }

    #[test]
    fn null_stdout_discards_output() {
        let opts = Options::new().stdout(StdioAction::Null);
        let mut proc =
            Subprocess::spawn(&args(&["/bin/sh", "-c", "echo discarded"]), &opts).expect("spawn");
        assert_eq!(proc.wait().expect("wait"), ExitStatus::Exited(0));
    }

    #[test]
    fn use_fd_redirects_into_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");
        let file = std::fs::File::create(&path).expect("create");
        let raw = std::os::unix::io::AsRawFd::as_raw_fd(&file);

        let opts = Options::new().stdout(StdioAction::UseFd(raw));
        let mut proc =
            Subprocess::spawn(&args(&["/bin/sh", "-c", "echo to-file"]), &opts).expect("spawn");
        assert_eq!(proc.wait().expect("wait"), ExitStatus::Exited(0));
        drop(file);

        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(content, "to-file\n");
    }

    #[test]
    fn killed_child_reports_signal() {
        let opts = Options::new();
        let mut proc =
            Subprocess::spawn(&args(&["/bin/sh", "-c", "kill -9 $$"]), &opts).expect("spawn");
        assert_eq!(proc.wait().expect("wait"), ExitStatus::Killed(libc::SIGKILL));
    }

    struct NoopHook;

    impl PreExecHook for NoopHook {
        fn run(&self) -> i32 {
            0
        }
    }

    struct FailingHook(i32);

    impl PreExecHook for FailingHook {
        fn run(&self) -> i32 {
            self.0
        }
    }

    #[test]
    fn pre_exec_hook_success_is_transparent() {
        let hook = NoopHook;
        let opts = Options::new().pre_exec_hook(&hook);
        let mut proc = Subprocess::spawn(&args(&["/bin/true"]), &opts).expect("spawn");
        assert_eq!(proc.wait().expect("wait"), ExitStatus::Exited(0));
    }

    #[test]
    fn pre_exec_hook_failure_is_reported_with_its_code() {
        let hook = FailingHook(libc::EPERM);
        let opts = Options::new().pre_exec_hook(&hook);
        let err = Subprocess::spawn(&args(&["/bin/true"]), &opts).unwrap_err();
        match err {
            SpawnError::Child { kind, errno, .. } => {
                assert_eq!(kind, ChildErrc::RunPreExecCallback);
                assert_eq!(errno, libc::EPERM);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn detached_spawn_needs_no_wait() {
        let opts = Options::new().detach();
        let proc = Subprocess::spawn(&args(&["/bin/true"]), &opts).expect("spawn");
        // The intermediate child was already reaped; the grandchild belongs
        // to init now.
        assert!(!proc.waitable());
    }

    #[test]
    fn detached_spawn_of_missing_executable_still_fails() {
        let opts = Options::new().detach();
        let err = Subprocess::spawn(&args(&["/does/not/exist"]), &opts).unwrap_err();
        match err {
            SpawnError::Child { kind, errno, .. } => {
                assert_eq!(kind, ChildErrc::ExecCallFailure);
                assert_eq!(errno, libc::ENOENT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
