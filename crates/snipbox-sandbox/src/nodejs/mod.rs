//! Node family runner.
//!
//! Same skeleton as the Python runner with two differences: the bootstrap
//! is a short prelude prepended to the user code (no encryption layer),
//! and the shadow set includes the resolver and TLS trust files so
//! outbound TCP and DNS work when network is enabled.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::capture::{self, Capture};
use crate::config::SandboxConfig;
use crate::error::{Result, RunnerError};
use crate::options::RunnerOptions;
use crate::policy::Family;
use crate::python::confine_on_exec;
use crate::rootfs::EphemeralRoot;

/// Library tree and per-run scratch space for the Node family.
pub const LIB_PATH: &str = "/var/sandbox/sandbox-nodejs";

const PRESCRIPT: &str = include_str!("prescript.js");

/// Host paths every Node launch shadows besides the binary: shared
/// libraries plus the resolver/TLS files DNS and HTTPS need.
#[cfg(target_arch = "x86_64")]
const SHADOW_PATHS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu",
    "/lib/x86_64-linux-gnu",
    "/lib64",
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/nsswitch.conf",
    "/etc/resolv.conf",
    "/run/systemd/resolve/stub-resolv.conf",
    "/run/resolvconf/resolv.conf",
    "/etc/hosts",
];

#[cfg(target_arch = "aarch64")]
const SHADOW_PATHS: &[&str] = &[
    "/usr/lib/aarch64-linux-gnu",
    "/lib/aarch64-linux-gnu",
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/nsswitch.conf",
    "/etc/resolv.conf",
    "/run/systemd/resolve/stub-resolv.conf",
    "/run/resolvconf/resolv.conf",
    "/etc/hosts",
];

pub struct NodeRunner {
    pub config: Arc<SandboxConfig>,
}

impl NodeRunner {
    pub fn new(config: Arc<SandboxConfig>) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        code: &str,
        timeout: Duration,
        stdin: Option<Vec<u8>>,
        options: &RunnerOptions,
    ) -> Result<Capture> {
        let config = &self.config;
        let interpreter = PathBuf::from(&config.nodejs_path);
        if !interpreter.exists() {
            return Err(RunnerError::InterpreterMissing(interpreter));
        }

        let run_id = Uuid::new_v4().to_string().replace('-', "_");
        let run_dir = Path::new(LIB_PATH).join("tmp").join(&run_id);
        fs::create_dir_all(&run_dir)?;

        let script_path = run_dir.join("index.js");
        fs::write(&script_path, bootstrap(code))?;

        let network_enabled = options.enable_network && config.enable_network;
        let root = assemble_root(&interpreter, &run_dir)?;

        let mut cmd = Command::new(&interpreter);
        cmd.arg(&script_path);
        cmd.env_clear();
        for (name, value) in config.proxy_env() {
            cmd.env(name, value);
        }
        cmd.current_dir(root.path());
        confine_on_exec(&mut cmd, root.path(), Family::Nodejs, network_enabled, config)?;

        let root_path = root.path().to_path_buf();
        let cleanup_dir = run_dir.clone();
        let hook = Box::new(move || {
            if let Err(err) = fs::remove_dir_all(&cleanup_dir) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %cleanup_dir.display(), %err, "failed to remove run directory");
                }
            }
            root.remove();
        });

        match capture::capture(cmd, timeout, stdin, Some(hook)) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                // The hook never ran; don't leave the scratch trees behind.
                let _ = fs::remove_dir_all(&run_dir);
                let _ = fs::remove_dir_all(&root_path);
                Err(err.into())
            }
        }
    }
}

fn bootstrap(code: &str) -> String {
    format!("{PRESCRIPT}\n{code}\n")
}

fn assemble_root(interpreter: &Path, run_dir: &Path) -> Result<EphemeralRoot> {
    let mut required: Vec<PathBuf> = SHADOW_PATHS.iter().map(PathBuf::from).collect();
    required.push(interpreter.to_path_buf());
    required.push(run_dir.to_path_buf());
    EphemeralRoot::assemble(Path::new(LIB_PATH), &required).map_err(RunnerError::Rootfs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_prepends_prelude() {
        let script = bootstrap("console.log(1)");
        assert!(script.starts_with("process.chdir(__dirname)"));
        assert!(script.contains("uncaughtException"));
        assert!(script.ends_with("console.log(1)\n"));
    }

    #[test]
    fn shadow_set_covers_resolver_and_tls() {
        assert!(SHADOW_PATHS.contains(&"/etc/resolv.conf"));
        assert!(SHADOW_PATHS.contains(&"/etc/hosts"));
        assert!(SHADOW_PATHS.contains(&"/etc/nsswitch.conf"));
        assert!(SHADOW_PATHS.contains(&"/etc/ssl/certs/ca-certificates.crt"));
    }
}
