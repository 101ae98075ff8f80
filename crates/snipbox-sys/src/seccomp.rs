//! Seccomp-BPF filter construction and loading.
//!
//! The filter is built from a [`FilterSpec`] describing three rule classes:
//!
//! 1. **Allow** - the syscall proceeds.
//! 2. **Errno** - the syscall returns a chosen errno instead of running.
//!    Used where an interpreter tolerates a clean failure but must not be
//!    killed, e.g. `clone3` answered with `ENOSYS` so glibc falls back to
//!    `clone`, or `fork` answered with `EPERM`.
//! 3. **Arg0 rules** - the syscall is allowed only when the low 32 bits of
//!    its first argument match one of the whitelisted values; any other
//!    value kills the process. Used to narrow `clone` to thread creation.
//!
//! Anything not covered by a rule hits the default action,
//! `SECCOMP_RET_KILL_PROCESS`.
//!
//! ## Program layout
//!
//! ```text
//! [0-2]  architecture check (kill on mismatch)
//! [3]    load syscall number
//! [...]  one handler per arg0 rule:
//!          JEQ nr          (fall in on match, skip handler otherwise)
//!          LD  args[0]
//!          JEQ v0 .. JEQ vN  -> ALLOW
//!          RET KILL          (no value matched)
//!          RET ALLOW
//!          LD  nr            (restore accumulator for later rules)
//! [...]  two instructions per allow rule:  JEQ nr / RET ALLOW
//! [...]  two instructions per errno rule:  JEQ nr / RET ERRNO|e
//! [last] RET KILL_PROCESS
//! ```
//!
//! Every jump in this layout is local (at most the length of one handler),
//! so the u8 jump-offset limit of classic BPF is never a concern no matter
//! how long the allow list grows.
//!
//! The spec references syscalls by raw number (`i64`); no name resolution
//! ever happens, so numbers newer than the build environment's libc are
//! representable as plain literals.

use rustix::io::Errno;

use crate::last_errno;

// Seccomp constants
const SECCOMP_SET_MODE_FILTER: u32 = 1;
const SECCOMP_FILTER_FLAG_TSYNC: u32 = 1;
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const SECCOMP_RET_DATA: u32 = 0x0000_ffff;

// BPF instruction classes
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;

// BPF ld fields
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;

// BPF jmp fields
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

#[cfg(target_arch = "x86_64")]
const AUDIT_ARCH_CURRENT: u32 = 0xc000_003e; // AUDIT_ARCH_X86_64
#[cfg(target_arch = "aarch64")]
const AUDIT_ARCH_CURRENT: u32 = 0xc000_00b7; // AUDIT_ARCH_AARCH64

// seccomp_data offsets (little-endian 64-bit)
const OFFSET_SYSCALL_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;
const OFFSET_ARGS_0: u32 = 16; // args[0], lower 32 bits

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl SockFilter {
    #[inline]
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    #[inline]
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct SockFprog {
    pub len: u16,
    pub filter: *const SockFilter,
}

/// A first-argument whitelist for one syscall.
///
/// The syscall is allowed only when the low 32 bits of `args[0]` equal one
/// of `allowed`; any other value kills the process.
#[derive(Debug, Clone)]
pub struct Arg0Rule {
    pub syscall: i64,
    pub allowed: Vec<u32>,
}

/// Complete description of a filter to build.
///
/// Invariant: `allow`, the syscalls of `errno_returns`, and the syscalls of
/// `arg0_rules` are pairwise disjoint. The policy layer enforces this before
/// handing a spec down; [`build_policy_filter`] debug-asserts it.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub allow: Vec<i64>,
    pub errno_returns: Vec<(i64, i32)>,
    pub arg0_rules: Vec<Arg0Rule>,
}

/// Maximum values in one arg0 handler (handler jumps must fit in a u8).
const MAX_ARG0_VALUES: usize = 250;

/// Build a BPF program from a [`FilterSpec`].
///
/// # Panics
///
/// Panics if an arg0 rule carries more than 250 values (jump offsets within
/// a handler are u8).
pub fn build_policy_filter(spec: &FilterSpec) -> Vec<SockFilter> {
    debug_assert!(spec_is_disjoint(spec), "overlapping filter rule classes");

    let mut filter = Vec::with_capacity(
        4 + spec.arg0_rules.iter().map(|r| r.allowed.len() + 5).sum::<usize>()
            + 2 * (spec.allow.len() + spec.errno_returns.len())
            + 1,
    );

    // Architecture check: anything foreign is killed outright.
    filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH));
    filter.push(SockFilter::jump(
        BPF_JMP | BPF_JEQ | BPF_K,
        AUDIT_ARCH_CURRENT,
        1,
        0,
    ));
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    // Load syscall number.
    filter.push(SockFilter::stmt(
        BPF_LD | BPF_W | BPF_ABS,
        OFFSET_SYSCALL_NR,
    ));

    // Arg0-constrained syscalls.
    for rule in &spec.arg0_rules {
        let k = rule.allowed.len();
        assert!(
            k <= MAX_ARG0_VALUES,
            "arg0 rule too large: {k} > {MAX_ARG0_VALUES}"
        );
        // Handler body after this jump: LD args0, k value checks, RET KILL,
        // RET ALLOW, LD nr.
        let handler_len = (k + 4) as u8;
        filter.push(SockFilter::jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            rule.syscall as u32,
            0,
            handler_len,
        ));
        filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARGS_0));
        for (i, &value) in rule.allowed.iter().enumerate() {
            // Jump over the remaining checks and the RET KILL, onto RET ALLOW.
            let to_allow = (k - i) as u8;
            filter.push(SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, value, to_allow, 0));
        }
        filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));
        filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
        // The accumulator still holds args[0]; restore the syscall number
        // before the rules below compare against it.
        filter.push(SockFilter::stmt(
            BPF_LD | BPF_W | BPF_ABS,
            OFFSET_SYSCALL_NR,
        ));
    }

    // Plain allow rules.
    for &nr in &spec.allow {
        filter.push(SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, nr as u32, 0, 1));
        filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    }

    // Errno rules.
    for &(nr, errno) in &spec.errno_returns {
        filter.push(SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, nr as u32, 0, 1));
        filter.push(SockFilter::stmt(
            BPF_RET | BPF_K,
            SECCOMP_RET_ERRNO | (errno as u32 & SECCOMP_RET_DATA),
        ));
    }

    // Default deny.
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    filter
}

fn spec_is_disjoint(spec: &FilterSpec) -> bool {
    let mut seen = std::collections::HashSet::new();
    spec.allow
        .iter()
        .chain(spec.errno_returns.iter().map(|(nr, _)| nr))
        .chain(spec.arg0_rules.iter().map(|r| &r.syscall))
        .all(|nr| seen.insert(*nr))
}

/// Set the no-new-privs bit for the calling process.
///
/// Must happen before the filter load; the kernel rejects unprivileged
/// `SECCOMP_SET_MODE_FILTER` otherwise.
pub fn set_no_new_privs() -> Result<(), Errno> {
    // SAFETY: prctl with PR_SET_NO_NEW_PRIVS takes no pointers.
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret != 0 {
        return Err(last_errno());
    }
    Ok(())
}

/// Load a seccomp filter on the calling thread group.
///
/// `SECCOMP_FILTER_FLAG_TSYNC` is always set so threads the interpreter
/// spawns later inherit the filter.
///
/// # Safety
///
/// `fprog` must point at a valid program. Loading is irreversible; the
/// filter applies to the caller for the rest of its life.
pub unsafe fn seccomp_set_mode_filter(fprog: &SockFprog) -> Result<(), Errno> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            SECCOMP_FILTER_FLAG_TSYNC,
            fprog as *const _,
        )
    };
    if ret != 0 { Err(last_errno()) } else { Ok(()) }
}
