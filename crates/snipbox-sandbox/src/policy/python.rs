//! Syscall tables for the Python family.
//!
//! Covers CPython startup (the filter precedes `exec`) plus steady-state
//! interpretation: memory management, futex, epoll, TLS setup, time, and
//! the loader's file probing. `clone`/`fork` are answered with `EPERM`, so
//! `os.fork()` raises `PermissionError` instead of killing the process;
//! `socket` is answered with `EPERM` unless the run has network enabled.

#[cfg(target_arch = "x86_64")]
mod table {
    use libc::*;

    pub const ALLOW: &[i64] = &[
        // file io
        SYS_read,
        SYS_write,
        SYS_open,
        SYS_openat,
        SYS_close,
        SYS_newfstatat,
        SYS_fstat,
        SYS_stat,
        SYS_lstat,
        SYS_statx,
        SYS_lseek,
        SYS_pread64,
        SYS_getdents64,
        SYS_getdents,
        SYS_writev,
        SYS_ioctl,
        SYS_fcntl,
        SYS_pipe2,
        SYS_dup,
        SYS_dup2,
        SYS_dup3,
        SYS_access,
        SYS_faccessat,
        SYS_faccessat2,
        SYS_readlink,
        SYS_readlinkat,
        SYS_getcwd,
        SYS_chdir,
        SYS_fadvise64,
        SYS_fstatfs,
        // loader / process image
        SYS_execve,
        // threads
        SYS_futex,
        // memory
        SYS_mmap,
        SYS_brk,
        SYS_mprotect,
        SYS_munmap,
        SYS_mremap,
        SYS_madvise,
        // user/group
        SYS_setuid,
        SYS_setgid,
        SYS_getuid,
        SYS_getgid,
        SYS_geteuid,
        SYS_getegid,
        SYS_getresuid,
        SYS_getresgid,
        // process
        SYS_getpid,
        SYS_getppid,
        SYS_gettid,
        SYS_exit,
        SYS_exit_group,
        SYS_tgkill,
        SYS_sched_yield,
        SYS_sched_getaffinity,
        SYS_set_tid_address,
        SYS_set_robust_list,
        SYS_get_robust_list,
        SYS_rseq,
        SYS_prlimit64,
        SYS_sysinfo,
        SYS_uname,
        SYS_arch_prctl,
        SYS_prctl,
        // signals
        SYS_rt_sigaction,
        SYS_rt_sigprocmask,
        SYS_rt_sigreturn,
        SYS_sigaltstack,
        // time
        SYS_clock_gettime,
        SYS_gettimeofday,
        SYS_time,
        SYS_nanosleep,
        SYS_clock_nanosleep,
        SYS_epoll_create1,
        SYS_epoll_ctl,
        SYS_pselect6,
        // random
        SYS_getrandom,
    ];

    pub const ALLOW_ERRNO: &[(i64, i32)] = &[
        (SYS_clone, EPERM),
        (SYS_fork, EPERM),
        (SYS_vfork, EPERM),
        (SYS_mkdir, EPERM),
        (SYS_mkdirat, EPERM),
        (SYS_socket, EPERM),
        (SYS_clone3, ENOSYS),
    ];

    pub const ALLOW_NETWORK: &[i64] = &[
        SYS_socket,
        SYS_connect,
        SYS_bind,
        SYS_listen,
        SYS_accept,
        SYS_accept4,
        SYS_sendto,
        SYS_recvfrom,
        SYS_sendmsg,
        SYS_sendmmsg,
        SYS_recvmsg,
        SYS_getsockopt,
        SYS_setsockopt,
        SYS_getsockname,
        SYS_getpeername,
        SYS_poll,
        SYS_ppoll,
        SYS_epoll_pwait,
        SYS_socketpair,
        SYS_shutdown,
    ];

    pub const ARG0_RULES: &[(i64, &[u32])] = &[];
}

#[cfg(target_arch = "aarch64")]
mod table {
    use libc::*;

    pub const ALLOW: &[i64] = &[
        // file io
        SYS_read,
        SYS_write,
        SYS_openat,
        SYS_close,
        SYS_newfstatat,
        SYS_fstat,
        SYS_statx,
        SYS_lseek,
        SYS_pread64,
        SYS_getdents64,
        SYS_writev,
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
        SYS_fadvise64,
        SYS_fstatfs,
        // loader / process image
        SYS_execve,
        // threads
        SYS_futex,
        // memory
        SYS_mmap,
        SYS_brk,
        SYS_mprotect,
        SYS_munmap,
        SYS_mremap,
        SYS_madvise,
        // user/group
        SYS_setuid,
        SYS_setgid,
        SYS_getuid,
        SYS_getgid,
        SYS_geteuid,
        SYS_getegid,
        SYS_getresuid,
        SYS_getresgid,
        // process
        SYS_getpid,
        SYS_getppid,
        SYS_gettid,
        SYS_exit,
        SYS_exit_group,
        SYS_tgkill,
        SYS_sched_yield,
        SYS_sched_getaffinity,
        SYS_set_tid_address,
        SYS_set_robust_list,
        SYS_get_robust_list,
        SYS_rseq,
        SYS_prlimit64,
        SYS_sysinfo,
        SYS_uname,
        SYS_prctl,
        // signals
        SYS_rt_sigaction,
        SYS_rt_sigprocmask,
        SYS_rt_sigreturn,
        SYS_sigaltstack,
        // time
        SYS_clock_gettime,
        SYS_gettimeofday,
        SYS_nanosleep,
        SYS_clock_nanosleep,
        SYS_epoll_create1,
        SYS_epoll_ctl,
        SYS_pselect6,
        SYS_timerfd_create,
        SYS_timerfd_settime,
        SYS_timerfd_gettime,
        // random
        SYS_getrandom,
    ];

    pub const ALLOW_ERRNO: &[(i64, i32)] = &[
        (SYS_clone, EPERM),
        (SYS_mkdirat, EPERM),
        (SYS_socket, EPERM),
        (SYS_clone3, ENOSYS),
    ];

    pub const ALLOW_NETWORK: &[i64] = &[
        SYS_socket,
        SYS_connect,
        SYS_bind,
        SYS_listen,
        SYS_accept,
        SYS_accept4,
        SYS_sendto,
        SYS_recvfrom,
        SYS_sendmsg,
        SYS_sendmmsg,
        SYS_recvmsg,
        SYS_getsockopt,
        SYS_setsockopt,
        SYS_getsockname,
        SYS_getpeername,
        SYS_ppoll,
        SYS_epoll_pwait,
        SYS_socketpair,
        SYS_shutdown,
    ];

    pub const ARG0_RULES: &[(i64, &[u32])] = &[];
}

pub use table::{ALLOW, ALLOW_ERRNO, ALLOW_NETWORK, ARG0_RULES};
