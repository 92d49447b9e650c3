//! # lumper-core
//!
//! The isolated-process launch pipeline:
//! - **[`fd`]**: scoped file-descriptor ownership.
//! - **[`process`]**: a `clone` + pre-exec hook + `exec` subprocess primitive
//!   that conveys child-side failures to the parent through an error pipe.
//! - **[`mount`]**: the in-child containment hook that stacks the overlay
//!   rootfs, populates `/dev`, and pivots into the new root under a strict
//!   no-heap-allocation discipline.
//! - **[`cgroup`]**: cgroup v1 lifecycle management tied to the child's PID.
//!
//! Everything that runs between `clone` and `exec` in the child is written
//! against raw `libc`; the child inherits the parent's address space but not
//! its locks or allocator state, so no path in that window may allocate,
//! lock, or unwind.

pub mod cgroup;
pub mod fd;
pub mod mount;
pub mod process;
