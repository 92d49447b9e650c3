//! Scoped file-descriptor ownership.
//!
//! Containment code cannot afford `close()` leaks across early-return paths,
//! so every descriptor in the launch pipeline is held by a [`ScopedFd`].

use std::os::unix::io::RawFd;

/// Owns at most one OS file descriptor and closes it on drop.
///
/// Not clonable; movable. Closing is idempotent: releasing an already-empty
/// handle is a no-op.
#[derive(Debug)]
pub struct ScopedFd(RawFd);

impl ScopedFd {
    /// Creates an empty handle owning nothing.
    #[must_use]
    pub const fn invalid() -> Self {
        Self(-1)
    }

    /// Takes ownership of `fd`.
    ///
    /// The caller must not close `fd` afterwards.
    #[must_use]
    pub const fn new(fd: RawFd) -> Self {
        Self(fd)
    }

    /// Returns the owned descriptor, or `-1` if empty.
    #[must_use]
    pub const fn get(&self) -> RawFd {
        self.0
    }

    /// Returns true if no descriptor is owned.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 < 0
    }

    /// Closes the owned descriptor, leaving the handle empty.
    pub fn release(&mut self) {
        if self.0 >= 0 {
            // SAFETY: we own the descriptor and clear it before returning,
            // so it is closed at most once.
            unsafe {
                libc::close(self.0);
            }
            self.0 = -1;
        }
    }

    /// Relinquishes ownership without closing, returning the raw descriptor.
    #[must_use]
    pub fn into_raw(mut self) -> RawFd {
        std::mem::replace(&mut self.0, -1)
    }
}

impl Default for ScopedFd {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Drop for ScopedFd {
    fn drop(&mut self) {
        self.release();
    }
}

/// Creates a `pipe2(O_CLOEXEC)` pair, returned as `(read, write)`.
///
/// # Errors
///
/// Returns the OS error if the `pipe2` syscall fails.
pub fn cloexec_pipe() -> std::io::Result<(ScopedFd, ScopedFd)> {
    let mut fds = [0 as RawFd; 2];
    // SAFETY: fds points to a valid 2-element array.
    let rv = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rv != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ScopedFd::new(fds[0]), ScopedFd::new(fds[1])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd_is_open(fd: RawFd) -> bool {
        // SAFETY: fcntl F_GETFD is harmless on any integer.
        unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
    }

    #[test]
    fn invalid_handle_is_empty() {
        let fd = ScopedFd::invalid();
        assert!(fd.is_empty());
        assert_eq!(fd.get(), -1);
    }

    #[test]
    fn release_closes_and_is_idempotent() {
        let (rd, _wr) = cloexec_pipe().expect("pipe2");
        let raw = rd.get();
        assert!(fd_is_open(raw));

        let mut rd = rd;
        rd.release();
        assert!(rd.is_empty());
        assert!(!fd_is_open(raw));

        // Second release is a no-op.
        rd.release();
        assert!(rd.is_empty());
    }

    #[test]
    fn drop_closes_descriptor() {
        let raw;
        {
            let (rd, _wr) = cloexec_pipe().expect("pipe2");
            raw = rd.get();
            assert!(fd_is_open(raw));
        }
        assert!(!fd_is_open(raw));
    }

    #[test]
    fn into_raw_relinquishes_ownership() {
        let (rd, _wr) = cloexec_pipe().expect("pipe2");
        let raw = rd.into_raw();
        assert!(fd_is_open(raw));
        // SAFETY: we took ownership back from the handle.
        unsafe {
            libc::close(raw);
        }
    }

    #[test]
    fn pipe_ends_have_cloexec_set() {
        let (rd, wr) = cloexec_pipe().expect("pipe2");
        for fd in [rd.get(), wr.get()] {
            // SAFETY: fd is a valid open descriptor.
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(flags != -1);
            assert_eq!(flags & libc::FD_CLOEXEC, libc::FD_CLOEXEC);
        }
    }
}
