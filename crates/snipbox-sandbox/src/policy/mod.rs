//! Syscall policy tables and their merge into a loadable filter.
//!
//! Each interpreter family carries four per-architecture tables:
//!
//! - `ALLOW` - syscalls the interpreter legitimately needs, including the
//!   startup path (the filter is installed before `exec`, so `execve` and
//!   the dynamic loader's file probing must pass).
//! - `ALLOW_ERRNO` - tolerated but answered with an errno instead of a
//!   kill, so the interpreter sees a clean failure. `clone3` is answered
//!   with `ENOSYS` everywhere so glibc falls back to `clone`.
//! - `ALLOW_NETWORK` - unioned into `ALLOW` only when the request and the
//!   global configuration both enable network access.
//! - `ARG0_RULES` - first-argument whitelists narrowing otherwise dangerous
//!   syscalls; the Node family allows `clone` only with the glibc
//!   thread-creation flag mask.
//!
//! For any syscall number, `ALLOW` and `ALLOW_ERRNO` are kept disjoint;
//! where the raw tables overlap (e.g. `socket` is errno'd by default but
//! network-allowed), the merge resolves it, and otherwise the more
//! restrictive action wins.

pub mod nodejs;
pub mod python;

use snipbox_sys::seccomp::Arg0Rule;
use snipbox_sys::FilterSpec;

/// Supported interpreter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Python,
    Nodejs,
}

impl Family {
    /// Map a request's language tag onto a family.
    pub fn from_language(language: &str) -> Option<Self> {
        match language {
            "python3" => Some(Self::Python),
            "nodejs" => Some(Self::Nodejs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python3",
            Self::Nodejs => "nodejs",
        }
    }

    fn table(&self) -> FamilyTable {
        match self {
            Self::Python => FamilyTable {
                allow: python::ALLOW,
                allow_errno: python::ALLOW_ERRNO,
                allow_network: python::ALLOW_NETWORK,
                arg0_rules: python::ARG0_RULES,
            },
            Self::Nodejs => FamilyTable {
                allow: nodejs::ALLOW,
                allow_errno: nodejs::ALLOW_ERRNO,
                allow_network: nodejs::ALLOW_NETWORK,
                arg0_rules: nodejs::ARG0_RULES,
            },
        }
    }
}

struct FamilyTable {
    allow: &'static [i64],
    allow_errno: &'static [(i64, i32)],
    allow_network: &'static [i64],
    arg0_rules: &'static [(i64, &'static [u32])],
}

/// glibc's thread-creation clone flags: CLONE_VM | CLONE_FS | CLONE_FILES |
/// CLONE_SIGHAND | CLONE_THREAD | CLONE_SYSVSEM | CLONE_SETTLS |
/// CLONE_PARENT_SETTID | CLONE_CHILD_CLEARTID.
pub const GLIBC_THREAD_CLONE_FLAGS: u32 = 0x003d_0f00;

/// Resolve the filter spec for one execution.
///
/// `allow_override`, when present (the `ALLOWED_SYSCALLS` configuration
/// knob), replaces the family's allow table outright; errno answers and
/// argument rules still apply.
pub fn resolve(
    family: Family,
    network_enabled: bool,
    allow_override: Option<&[i64]>,
) -> FilterSpec {
    let table = family.table();

    let mut allow: Vec<i64> = match allow_override {
        Some(numbers) => numbers.to_vec(),
        None => table.allow.to_vec(),
    };
    let mut errno_returns: Vec<(i64, i32)> = table.allow_errno.to_vec();

    if network_enabled {
        // Network syscalls leave the errno set when the request may use them.
        errno_returns.retain(|(nr, _)| !table.allow_network.contains(nr));
        allow.extend_from_slice(table.allow_network);
    }

    allow.sort_unstable();
    allow.dedup();

    // Restrictive action wins on any remaining overlap.
    allow.retain(|nr| !errno_returns.iter().any(|(e, _)| e == nr));
    allow.retain(|nr| !table.arg0_rules.iter().any(|(a, _)| a == nr));

    let arg0_rules = table
        .arg0_rules
        .iter()
        .map(|&(syscall, allowed)| Arg0Rule {
            syscall,
            allowed: allowed.to_vec(),
        })
        .collect();

    FilterSpec {
        allow,
        errno_returns,
        arg0_rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_disjoint(allow: &[i64], errno: &[(i64, i32)]) {
        for (nr, _) in errno {
            assert!(
                !allow.contains(nr),
                "syscall {nr} appears in both ALLOW and ALLOW_ERRNO"
            );
        }
    }

    #[test]
    fn family_from_language() {
        assert_eq!(Family::from_language("python3"), Some(Family::Python));
        assert_eq!(Family::from_language("nodejs"), Some(Family::Nodejs));
        assert_eq!(Family::from_language("ruby"), None);
    }

    #[test]
    fn raw_tables_are_disjoint() {
        assert_disjoint(python::ALLOW, python::ALLOW_ERRNO);
        assert_disjoint(nodejs::ALLOW, nodejs::ALLOW_ERRNO);
    }

    #[test]
    fn merge_is_disjoint_with_network() {
        for family in [Family::Python, Family::Nodejs] {
            for network in [false, true] {
                let spec = resolve(family, network, None);
                let mut seen = std::collections::HashSet::new();
                for nr in spec
                    .allow
                    .iter()
                    .chain(spec.errno_returns.iter().map(|(nr, _)| nr))
                    .chain(spec.arg0_rules.iter().map(|r| &r.syscall))
                {
                    assert!(seen.insert(*nr), "{family:?} net={network}: {nr} duplicated");
                }
            }
        }
    }

    #[test]
    fn network_disabled_keeps_socket_errno() {
        let spec = resolve(Family::Python, false, None);
        assert!(spec
            .errno_returns
            .iter()
            .any(|&(nr, errno)| nr == libc::SYS_socket && errno == libc::EPERM));
        assert!(!spec.allow.contains(&libc::SYS_socket));
    }

    #[test]
    fn network_enabled_allows_socket() {
        let spec = resolve(Family::Python, true, None);
        assert!(spec.allow.contains(&libc::SYS_socket));
        assert!(!spec.errno_returns.iter().any(|&(nr, _)| nr == libc::SYS_socket));
        assert!(spec.allow.contains(&libc::SYS_connect));
    }

    #[test]
    fn clone3_answered_with_enosys() {
        for family in [Family::Python, Family::Nodejs] {
            let spec = resolve(family, false, None);
            assert!(
                spec.errno_returns
                    .iter()
                    .any(|&(nr, errno)| nr == libc::SYS_clone3 && errno == libc::ENOSYS),
                "{family:?} must answer clone3 with ENOSYS"
            );
        }
    }

    #[test]
    fn node_clone_is_narrowed_to_thread_creation() {
        let spec = resolve(Family::Nodejs, false, None);
        let rule = spec
            .arg0_rules
            .iter()
            .find(|r| r.syscall == libc::SYS_clone)
            .expect("node must carry a clone arg rule");
        assert_eq!(rule.allowed, vec![GLIBC_THREAD_CLONE_FLAGS]);
        assert!(!spec.allow.contains(&libc::SYS_clone));
    }

    #[test]
    fn python_clone_answered_with_eperm() {
        let spec = resolve(Family::Python, false, None);
        assert!(spec
            .errno_returns
            .iter()
            .any(|&(nr, errno)| nr == libc::SYS_clone && errno == libc::EPERM));
    }

    #[test]
    fn startup_syscalls_present() {
        for family in [Family::Python, Family::Nodejs] {
            let spec = resolve(family, false, None);
            for nr in [libc::SYS_execve, libc::SYS_openat, libc::SYS_mmap] {
                assert!(spec.allow.contains(&nr), "{family:?} missing {nr}");
            }
        }
    }

    #[test]
    fn override_replaces_allow_list() {
        let spec = resolve(Family::Python, false, Some(&[libc::SYS_read, libc::SYS_write]));
        assert_eq!(spec.allow, vec![libc::SYS_read, libc::SYS_write]);
        // errno answers survive an override
        assert!(!spec.errno_returns.is_empty());
    }
}
