//! Python family runner.
//!
//! Each run gets a private directory under `<LIB_PATH>/tmp/<run-id>`
//! holding the rendered bootstrap and any uploaded files, an ephemeral
//! root shadowing the interpreter plus its library tree, and a child
//! process confined via `pre_exec` before the interpreter starts. Output
//! flows through the capture supervisor; the after-exit hook deletes both
//! the run directory and the root.

pub mod deps;

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::warn;
use uuid::Uuid;

use snipbox_sys::confine;

use crate::capture::{self, Capture};
use crate::config::SandboxConfig;
use crate::error::{Result, RunnerError};
use crate::options::RunnerOptions;
use crate::payload;
use crate::policy::{self, Family};
use crate::rootfs::EphemeralRoot;

/// Hermetic library tree and per-run scratch space for the Python family.
pub const LIB_PATH: &str = "/var/sandbox/sandbox-python";

const PRESCRIPT: &str = include_str!("prescript.py");

pub struct PythonRunner {
    pub config: Arc<SandboxConfig>,
}

impl PythonRunner {
    pub fn new(config: Arc<SandboxConfig>) -> Self {
        Self { config }
    }

    /// Execute `code` under confinement and return the capture handle.
    pub fn run(
        &self,
        code: &str,
        timeout: Duration,
        stdin: Option<Vec<u8>>,
        preload: &str,
        options: &RunnerOptions,
    ) -> Result<Capture> {
        let config = &self.config;
        let interpreter = PathBuf::from(&config.python_path);
        if !interpreter.exists() {
            return Err(RunnerError::InterpreterMissing(interpreter));
        }

        let run_id = Uuid::new_v4().to_string().replace('-', "_");
        let run_dir = Path::new(LIB_PATH).join("tmp").join(&run_id);
        fs::create_dir_all(&run_dir)?;

        let key = payload::generate_key();
        let bootstrap = render_prescript(code, &self.effective_preload(preload, options), &key);
        let script_path = run_dir.join("main.py");
        fs::write(&script_path, bootstrap)?;

        write_user_files(&run_dir, &options.files);

        let interpreter = if options.dependencies.is_empty() {
            interpreter
        } else {
            create_venv(&run_dir, options, config)?
        };

        let network_enabled = options.enable_network && config.enable_network;
        let root = self.assemble_root(&run_dir)?;

        let mut cmd = Command::new(&interpreter);
        cmd.arg(&script_path).arg(payload::key_b64(&key));
        cmd.env_clear();
        for (name, value) in config.proxy_env() {
            cmd.env(name, value);
        }
        cmd.current_dir(root.path());
        confine_on_exec(&mut cmd, root.path(), Family::Python, network_enabled, config)?;

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

    /// Request preload, prefixed by the catalog snippets of any requested
    /// dependencies so their lazy initialisation is warmed before user code.
    fn effective_preload(&self, preload: &str, options: &RunnerOptions) -> String {
        let mut chunks = Vec::new();
        for dep in &options.dependencies {
            if let Some(snippet) = deps::preload_snippet(&dep.name, &dep.version) {
                chunks.push(snippet);
            }
        }
        if !preload.is_empty() {
            chunks.push(preload.to_string());
        }
        chunks.join("\n")
    }

    fn assemble_root(&self, run_dir: &Path) -> Result<EphemeralRoot> {
        let config = &self.config;
        let lib_root = Path::new(LIB_PATH);
        let root = EphemeralRoot::assemble(lib_root, &[]).map_err(RunnerError::Rootfs)?;

        // Library paths come from the hermetic tree when prepare() has
        // materialised them, falling back to the live host path.
        for lib_path in &config.python_lib_paths {
            let visible = PathBuf::from(lib_path);
            let relative = visible.strip_prefix("/").unwrap_or(&visible);
            let curated = lib_root.join(relative);
            let source = if curated.exists() { curated } else { visible.clone() };
            if !source.exists() {
                warn!(path = %lib_path, "library path missing, skipping shadow");
                continue;
            }
            root.shadow_as(&source, &visible).map_err(RunnerError::Rootfs)?;
        }

        root.shadow(Path::new(&config.python_path))
            .map_err(RunnerError::Rootfs)?;
        root.shadow(run_dir).map_err(RunnerError::Rootfs)?;
        Ok(root)
    }
}

/// Arrange for the child to confine itself between fork and exec.
///
/// The BPF program and the root path are prepared in the parent so the
/// hook itself only performs raw syscalls.
pub(crate) fn confine_on_exec(
    cmd: &mut Command,
    root: &Path,
    family: Family,
    network_enabled: bool,
    config: &SandboxConfig,
) -> Result<()> {
    let spec = policy::resolve(family, network_enabled, config.allow_override());
    let filter = snipbox_sys::build_policy_filter(&spec);
    let root_c = CString::new(root.as_os_str().as_encoded_bytes())
        .map_err(|_| RunnerError::Rootfs(io::Error::other("root path contains NUL")))?;
    let uid = config.sandbox_uid;
    let gid = config.sandbox_gid;

    // SAFETY: the hook runs single-threaded in the forked child and only
    // touches prebuilt data and raw syscalls.
    unsafe {
        cmd.pre_exec(move || {
            unsafe { confine(&root_c, uid, gid, &filter) }
                .map_err(|errno| io::Error::from_raw_os_error(errno.raw_os_error()))
        });
    }
    Ok(())
}

/// Render the bootstrap script around the scrambled user code.
fn render_prescript(code: &str, preload: &str, key: &[u8; payload::KEY_LEN]) -> String {
    PRESCRIPT
        .replace("{{code_b64}}", &payload::encode(code, key))
        .replace("{{preload_b64}}", &BASE64.encode(preload.as_bytes()))
}

/// Write uploaded files into the run directory, dropping any whose path
/// would land outside it.
pub(crate) fn write_user_files(
    run_dir: &Path,
    files: &std::collections::BTreeMap<String, String>,
) {
    for (path, content) in files {
        let Some(relative) = sanitize_upload_path(path) else {
            warn!(%path, "dropping uploaded file with unsafe path");
            continue;
        };
        let full = run_dir.join(relative);
        if let Some(parent) = full.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(%path, %err, "failed to create upload directory");
                continue;
            }
        }
        if let Err(err) = fs::write(&full, content) {
            warn!(%path, %err, "failed to write uploaded file");
        }
    }
}

/// Normalise an uploaded path, refusing anything that could escape the run
/// directory: absolute paths, parent traversal at any depth, empty names.
pub(crate) fn sanitize_upload_path(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        return None;
    }
    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Create a per-run virtual environment with the isolated installer tool
/// and return its interpreter.
fn create_venv(run_dir: &Path, options: &RunnerOptions, config: &SandboxConfig) -> Result<PathBuf> {
    run_installer(Command::new("uv").args(["init", "--bare"]).current_dir(run_dir))?;
    run_installer(
        Command::new("uv")
            .args(["venv", "--system-site-packages"])
            .current_dir(run_dir),
    )?;

    let venv_python = run_dir.join(".venv/bin/python3");
    for dep in &options.dependencies {
        let mut cmd = Command::new("uv");
        cmd.arg("pip")
            .arg("install")
            .arg("--python")
            .arg(&venv_python)
            .arg(dep.specifier())
            .current_dir(run_dir);
        if !config.python_pip_mirror_url.is_empty() {
            cmd.arg("--index-url").arg(&config.python_pip_mirror_url);
        }
        run_installer(&mut cmd)?;
    }
    Ok(venv_python)
}

fn run_installer(cmd: &mut Command) -> Result<()> {
    let output = cmd
        .output()
        .map_err(|err| RunnerError::Venv(format!("installer tool unavailable: {err}")))?;
    if !output.status.success() {
        return Err(RunnerError::Venv(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn sanitize_accepts_plain_relative_paths() {
        assert_eq!(
            sanitize_upload_path("test.txt"),
            Some(PathBuf::from("test.txt"))
        );
        assert_eq!(
            sanitize_upload_path("data/input.csv"),
            Some(PathBuf::from("data/input.csv"))
        );
        assert_eq!(
            sanitize_upload_path("./a/./b.txt"),
            Some(PathBuf::from("a/b.txt"))
        );
    }

    #[test]
    fn sanitize_rejects_escapes() {
        assert_eq!(sanitize_upload_path("../evil.txt"), None);
        assert_eq!(sanitize_upload_path("a/../../evil.txt"), None);
        assert_eq!(sanitize_upload_path("/etc/passwd"), None);
        assert_eq!(sanitize_upload_path(""), None);
        assert_eq!(sanitize_upload_path("."), None);
    }

    #[test]
    fn user_files_outside_run_dir_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = BTreeMap::new();
        files.insert("ok.txt".to_string(), "fine".to_string());
        files.insert("../escape.txt".to_string(), "nope".to_string());
        write_user_files(dir.path(), &files);

        assert_eq!(fs::read_to_string(dir.path().join("ok.txt")).unwrap(), "fine");
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn empty_files_map_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_user_files(dir.path(), &BTreeMap::new());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rendered_prescript_has_no_placeholders() {
        let key = payload::generate_key();
        let rendered = render_prescript("print(1)", "import json", &key);
        assert!(!rendered.contains("{{code_b64}}"));
        assert!(!rendered.contains("{{preload_b64}}"));
    }

    #[test]
    fn rendered_payload_decodes_back_to_code() {
        let key = payload::generate_key();
        let code = "print('hello world')";
        let rendered = render_prescript(code, "", &key);
        let embedded = rendered
            .lines()
            .find(|l| l.contains("payload = base64.b64decode("))
            .and_then(|l| l.split('"').nth(1))
            .expect("payload line present");
        assert_eq!(payload::decode(embedded, &key).as_deref(), Some(code));
    }
}
