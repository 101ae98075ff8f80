//! Confinement sequence for a forked child.
//!
//! [`confine`] is designed to run inside a `pre_exec` hook: after `fork`,
//! before `exec`. The ordering is load-bearing and must not change:
//!
//! 1. `chroot` into the ephemeral root, `chdir` to `/` inside it.
//! 2. `PR_SET_NO_NEW_PRIVS`.
//! 3. Load the BPF filter (TSYNC, so later threads inherit it).
//! 4. `setgid` then `setuid` - setgid needs a capability that setuid drops.
//!
//! The filter program itself is built by the parent before `spawn` so the
//! hook only performs raw syscalls on prebuilt data.

use std::ffi::CStr;

use rustix::io::Errno;

use crate::last_errno;
use crate::seccomp::{seccomp_set_mode_filter, set_no_new_privs, SockFilter, SockFprog};

/// Confine the calling process: chroot + no-new-privs + seccomp + uid drop.
///
/// `root` is the ephemeral root directory, `filter` a program from
/// [`crate::build_policy_filter`]. On success every syscall outside the
/// filter's policy terminates the process.
///
/// # Safety
///
/// Irreversible for the calling process. Intended for the child side of a
/// fork only; calling it in a process you want to keep is a mistake.
pub unsafe fn confine(root: &CStr, uid: u32, gid: u32, filter: &[SockFilter]) -> Result<(), Errno> {
    if unsafe { libc::chroot(root.as_ptr()) } != 0 {
        return Err(last_errno());
    }
    if unsafe { libc::chdir(c"/".as_ptr()) } != 0 {
        return Err(last_errno());
    }

    set_no_new_privs()?;

    let prog = SockFprog {
        len: filter.len() as u16,
        filter: filter.as_ptr(),
    };
    unsafe { seccomp_set_mode_filter(&prog) }?;

    if unsafe { libc::setgid(gid) } != 0 {
        return Err(last_errno());
    }
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(last_errno());
    }

    Ok(())
}
