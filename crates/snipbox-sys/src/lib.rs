//! Low-level Linux confinement primitives for snipbox.
//!
//! This crate owns the pieces that talk to the kernel directly:
//!
//! - **seccomp** - classic-BPF filter construction and `seccomp(2)` loading
//! - **privilege** - the chroot → no-new-privs → filter → setgid → setuid
//!   sequence executed in a forked child before `exec`
//!
//! For everything else (policy tables, process supervision, runners), see
//! `snipbox-sandbox`.
//!
//! # Safety
//!
//! This crate contains raw syscall wrappers. Casts between integer types
//! are unavoidable when interfacing with the kernel ABI.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod privilege;
pub mod seccomp;

pub use privilege::confine;
pub use seccomp::{build_policy_filter, FilterSpec, SockFilter, SockFprog};

#[inline]
pub fn last_errno() -> rustix::io::Errno {
    // SAFETY: __errno_location always returns valid thread-local pointer.
    rustix::io::Errno::from_raw_os_error(unsafe { *libc::__errno_location() })
}
