//! Sandbox-facing configuration snapshot.
//!
//! Loaded once at startup by the service layer and injected into every
//! runner as an immutable reference. Nothing here mutates after load; the
//! dependency refresher owns the only post-startup writes and those go to
//! the library tree on disk, not to this struct.

use std::time::Duration;

use serde::Deserialize;

fn default_python_path() -> String {
    "/usr/local/bin/python3".into()
}

fn default_nodejs_path() -> String {
    "/usr/local/bin/node".into()
}

fn default_deps_interval() -> String {
    "30m".into()
}

fn default_requirements_path() -> String {
    "dependencies/python-requirements.txt".into()
}

fn default_sandbox_uid() -> u32 {
    65537
}

fn default_sandbox_gid() -> u32 {
    1000
}

/// Host paths shadowed into the Python library tree and ephemeral roots.
#[cfg(target_arch = "x86_64")]
pub fn default_python_lib_paths() -> Vec<String> {
    [
        "/usr/local/lib/python3.10",
        "/usr/lib/python3.10",
        "/usr/lib/python3",
        "/usr/lib/x86_64-linux-gnu",
        "/lib/x86_64-linux-gnu",
        "/lib64",
        "/etc/ssl/certs/ca-certificates.crt",
        "/etc/nsswitch.conf",
        "/etc/hosts",
        "/etc/resolv.conf",
        "/run/systemd/resolve/stub-resolv.conf",
        "/run/resolvconf/resolv.conf",
        "/etc/localtime",
        "/usr/share/zoneinfo",
        "/etc/timezone",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(target_arch = "aarch64")]
pub fn default_python_lib_paths() -> Vec<String> {
    [
        "/usr/local/lib/python3.10",
        "/usr/lib/python3.10",
        "/usr/lib/python3",
        "/usr/lib/aarch64-linux-gnu",
        "/lib/aarch64-linux-gnu",
        "/etc/ssl/certs/ca-certificates.crt",
        "/etc/nsswitch.conf",
        "/etc/hosts",
        "/etc/resolv.conf",
        "/run/systemd/resolve/stub-resolv.conf",
        "/run/resolvconf/resolv.conf",
        "/etc/localtime",
        "/usr/share/zoneinfo",
        "/etc/timezone",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub socks5: String,
    #[serde(default)]
    pub https: String,
    #[serde(default)]
    pub http: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub python_path: String,
    pub python_lib_paths: Vec<String>,
    pub python_pip_mirror_url: String,
    pub python_deps_update_interval: String,
    pub python_requirements_path: String,
    pub nodejs_path: String,
    pub enable_network: bool,
    pub enable_preload: bool,
    pub enable_custom_dependencies: bool,
    pub allowed_syscalls: Vec<i64>,
    pub sandbox_uid: u32,
    pub sandbox_gid: u32,
    pub proxy: ProxyConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_path: default_python_path(),
            python_lib_paths: default_python_lib_paths(),
            python_pip_mirror_url: String::new(),
            python_deps_update_interval: default_deps_interval(),
            python_requirements_path: default_requirements_path(),
            nodejs_path: default_nodejs_path(),
            enable_network: false,
            enable_preload: false,
            enable_custom_dependencies: false,
            allowed_syscalls: Vec::new(),
            sandbox_uid: default_sandbox_uid(),
            sandbox_gid: default_sandbox_gid(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// The explicit allow-list override, if one is configured.
    pub fn allow_override(&self) -> Option<&[i64]> {
        if self.allowed_syscalls.is_empty() {
            None
        } else {
            Some(&self.allowed_syscalls)
        }
    }

    /// Proxy environment passed to interpreters. A socks5 proxy wins over
    /// scheme-specific ones.
    pub fn proxy_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if !self.proxy.socks5.is_empty() {
            env.push(("HTTPS_PROXY".into(), self.proxy.socks5.clone()));
            env.push(("HTTP_PROXY".into(), self.proxy.socks5.clone()));
        } else {
            if !self.proxy.https.is_empty() {
                env.push(("HTTPS_PROXY".into(), self.proxy.https.clone()));
            }
            if !self.proxy.http.is_empty() {
                env.push(("HTTP_PROXY".into(), self.proxy.http.clone()));
            }
        }
        env
    }

    /// Parsed dependency-refresh interval; `30m` when unset or malformed.
    pub fn deps_update_interval(&self) -> Duration {
        parse_interval(&self.python_deps_update_interval)
            .unwrap_or(Duration::from_secs(30 * 60))
    }
}

/// Parse intervals of the form `90s`, `30m`, `2h`; a bare number is seconds.
pub fn parse_interval(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (number, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        _ => (value, None),
    };
    let number: u64 = number.parse().ok()?;
    let seconds = match unit {
        None | Some('s') => number,
        Some('m') => number * 60,
        Some('h') => number * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parsing() {
        assert_eq!(parse_interval("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_interval("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_interval("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_interval("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("soon"), None);
    }

    #[test]
    fn socks5_proxy_wins() {
        let config = SandboxConfig {
            proxy: ProxyConfig {
                socks5: "socks5://127.0.0.1:1080".into(),
                https: "https://proxy:3128".into(),
                http: "http://proxy:3128".into(),
            },
            ..Default::default()
        };
        let env = config.proxy_env();
        assert_eq!(env.len(), 2);
        assert!(env
            .iter()
            .all(|(_, v)| v == "socks5://127.0.0.1:1080"));
    }

    #[test]
    fn scheme_proxies_apply_without_socks5() {
        let config = SandboxConfig {
            proxy: ProxyConfig {
                https: "https://proxy:3128".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let env = config.proxy_env();
        assert_eq!(env, vec![("HTTPS_PROXY".into(), "https://proxy:3128".into())]);
    }

    #[test]
    fn allow_override_empty_is_none() {
        let config = SandboxConfig::default();
        assert!(config.allow_override().is_none());
        let config = SandboxConfig {
            allowed_syscalls: vec![0, 1],
            ..Default::default()
        };
        assert_eq!(config.allow_override(), Some(&[0i64, 1][..]));
    }
}
