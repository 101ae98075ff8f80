//! Syscall tables for the Node family.
//!
//! Node needs real threads (V8 workers, libuv's pool), so `clone` is
//! allowed but narrowed by an argument rule to the glibc thread-creation
//! flag mask; anything else, like a bare `fork()` flag set, traps. `clone3`
//! is answered with `ENOSYS` so glibc falls back to `clone` and the rule
//! stays inspectable.

use super::GLIBC_THREAD_CLONE_FLAGS;

#[cfg(target_arch = "x86_64")]
mod table {
    use libc::*;

    pub const ALLOW: &[i64] = &[
        // file
        SYS_read,
        SYS_write,
        SYS_open,
        SYS_openat,
        SYS_close,
        SYS_newfstatat,
        SYS_fstat,
        SYS_statx,
        SYS_lseek,
        SYS_pread64,
        SYS_pwrite64,
        SYS_preadv,
        SYS_pwritev,
        SYS_getdents64,
        SYS_ioctl,
        SYS_fcntl,
        SYS_pipe2,
        SYS_dup,
        SYS_dup2,
        SYS_dup3,
        SYS_access,
        SYS_faccessat2,
        SYS_readlink,
        SYS_readlinkat,
        SYS_getcwd,
        SYS_chdir,
        SYS_eventfd2,
        // loader / process image
        SYS_execve,
        // process
        SYS_getpid,
        SYS_getppid,
        SYS_gettid,
        SYS_tgkill,
        SYS_futex,
        SYS_exit,
        SYS_exit_group,
        SYS_set_tid_address,
        SYS_set_robust_list,
        SYS_sched_getaffinity,
        SYS_sched_yield,
        SYS_prlimit64,
        SYS_sysinfo,
        SYS_uname,
        SYS_prctl,
        SYS_arch_prctl,
        SYS_madvise,
        // memory
        SYS_mmap,
        SYS_munmap,
        SYS_mprotect,
        SYS_mremap,
        SYS_brk,
        // signals
        SYS_rt_sigaction,
        SYS_rt_sigprocmask,
        SYS_rt_sigreturn,
        SYS_sigaltstack,
        // user/group
        SYS_setuid,
        SYS_setgid,
        SYS_getuid,
        SYS_getgid,
        SYS_geteuid,
        SYS_getegid,
        // epoll
        SYS_epoll_create1,
        SYS_epoll_ctl,
        SYS_epoll_wait,
        SYS_epoll_pwait,
        // time
        SYS_clock_gettime,
        SYS_clock_getres,
        SYS_gettimeofday,
        SYS_time,
        SYS_nanosleep,
        SYS_clock_nanosleep,
        SYS_pselect6,
        SYS_timerfd_create,
        SYS_timerfd_settime,
        SYS_timerfd_gettime,
        // random / misc
        SYS_getrandom,
        SYS_rseq,
    ];

    pub const ALLOW_ERRNO: &[(i64, i32)] = &[(SYS_clone3, ENOSYS)];

    pub const ALLOW_NETWORK: &[i64] = &[
        SYS_socket,
        SYS_connect,
        SYS_bind,
        SYS_listen,
        SYS_accept,
        SYS_accept4,
        SYS_sendto,
        SYS_recvfrom,
        SYS_getsockname,
        SYS_getpeername,
        SYS_setsockopt,
        SYS_getsockopt,
        SYS_sendmsg,
        SYS_sendmmsg,
        SYS_recvmsg,
        SYS_recvmmsg,
        SYS_poll,
        SYS_ppoll,
        SYS_socketpair,
        SYS_shutdown,
        SYS_fstatfs,
    ];
}

#[cfg(target_arch = "aarch64")]
mod table {
    use libc::*;

    pub const ALLOW: &[i64] = &[
        // file
        SYS_read,
        SYS_write,
        SYS_openat,
        SYS_close,
        SYS_newfstatat,
        SYS_fstat,
        SYS_statx,
        SYS_lseek,
        SYS_pread64,
        SYS_pwrite64,
        SYS_preadv,
        SYS_pwritev,
        SYS_getdents64,
        SYS_ioctl,
        SYS_fcntl,
        SYS_pipe2,
        SYS_dup,
        SYS_dup3,
        SYS_faccessat,
        SYS_faccessat2,
        SYS_readlinkat,
        SYS_getcwd,
        SYS_chdir,
        SYS_eventfd2,
        // loader / process image
        SYS_execve,
        // process
        SYS_getpid,
        SYS_getppid,
        SYS_gettid,
        SYS_tgkill,
        SYS_tkill,
        SYS_futex,
        SYS_exit,
        SYS_exit_group,
        SYS_set_tid_address,
        SYS_set_robust_list,
        SYS_sched_getaffinity,
        SYS_sched_yield,
        SYS_prlimit64,
        SYS_times,
        SYS_sysinfo,
        SYS_uname,
        SYS_prctl,
        SYS_madvise,
        // memory
        SYS_mmap,
        SYS_munmap,
        SYS_mprotect,
        SYS_mremap,
        SYS_brk,
        SYS_mlockall,
        SYS_munlockall,
        SYS_mincore,
        // signals
        SYS_rt_sigaction,
        SYS_rt_sigprocmask,
        SYS_rt_sigreturn,
        SYS_sigaltstack,
        // user/group
        SYS_setuid,
        SYS_setgid,
        SYS_getuid,
        SYS_getgid,
        SYS_geteuid,
        SYS_getegid,
        SYS_capget,
        SYS_setfsuid,
        SYS_setfsgid,
        SYS_setpgid,
        // epoll
        SYS_epoll_create1,
        SYS_epoll_ctl,
        SYS_epoll_pwait,
        // time
        SYS_clock_gettime,
        SYS_clock_getres,
        SYS_gettimeofday,
        SYS_nanosleep,
        SYS_clock_nanosleep,
        SYS_pselect6,
        SYS_timerfd_create,
        SYS_timerfd_settime,
        SYS_timerfd_gettime,
        // V8 probes these during startup even without network
        SYS_getsockname,
        SYS_getsockopt,
        // async io
        SYS_io_uring_setup,
        SYS_io_uring_enter,
        SYS_io_uring_register,
        // random / misc
        SYS_getrandom,
        SYS_rseq,
    ];

    pub const ALLOW_ERRNO: &[(i64, i32)] = &[(SYS_clone3, ENOSYS)];

    pub const ALLOW_NETWORK: &[i64] = &[
        SYS_socket,
        SYS_connect,
        SYS_bind,
        SYS_listen,
        SYS_accept,
        SYS_accept4,
        SYS_sendto,
        SYS_recvfrom,
        SYS_getpeername,
        SYS_setsockopt,
        SYS_sendmsg,
        SYS_sendmmsg,
        SYS_recvmsg,
        SYS_recvmmsg,
        SYS_ppoll,
        SYS_socketpair,
        SYS_shutdown,
        SYS_fstatfs,
    ];
}

pub use table::{ALLOW, ALLOW_ERRNO, ALLOW_NETWORK};

pub const ARG0_RULES: &[(i64, &[u32])] =
    &[(libc::SYS_clone, &[GLIBC_THREAD_CLONE_FLAGS])];
