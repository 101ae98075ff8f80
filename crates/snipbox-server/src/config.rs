//! Service configuration: YAML file plus environment overrides.
//!
//! Environment variables always win over the file. The loaded value is an
//! immutable snapshot shared behind an `Arc`; nothing reconfigures at
//! runtime.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use snipbox_sandbox::SandboxConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub debug: bool,
    pub key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8194,
            debug: false,
            key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub max_workers: usize,
    pub max_requests: usize,
    /// Per-execution wall clock in seconds; zero falls back to the
    /// supervisor's 5 s default.
    pub worker_timeout: u64,
    #[serde(flatten)]
    pub sandbox: SandboxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            max_workers: 4,
            max_requests: 50,
            worker_timeout: 5,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    /// Load from a YAML file, then apply process-environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("failed to read {}: {err}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&file)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Split out from [`load`]
    /// so tests can drive it without touching the process environment.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(value) = get("DEBUG").and_then(|v| v.parse().ok()) {
            self.app.debug = value;
        }
        if let Some(value) = get("MAX_WORKERS").and_then(|v| v.parse().ok()) {
            self.max_workers = value;
        }
        if let Some(value) = get("MAX_REQUESTS").and_then(|v| v.parse().ok()) {
            self.max_requests = value;
        }
        if let Some(value) = get("SANDBOX_PORT").and_then(|v| v.parse().ok()) {
            self.app.port = value;
        }
        if let Some(value) = get("WORKER_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.worker_timeout = value;
        }
        if let Some(value) = get("API_KEY") {
            self.app.key = value;
        }
        if let Some(value) = get("PYTHON_PATH") {
            self.sandbox.python_path = value;
        }
        if let Some(value) = get("PYTHON_LIB_PATH") {
            self.sandbox.python_lib_paths =
                value.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(value) = get("PIP_MIRROR_URL") {
            self.sandbox.python_pip_mirror_url = value;
        }
        if let Some(value) = get("PYTHON_DEPS_UPDATE_INTERVAL") {
            self.sandbox.python_deps_update_interval = value;
        }
        if let Some(value) = get("NODEJS_PATH") {
            self.sandbox.nodejs_path = value;
        }
        if let Some(value) = get("ENABLE_NETWORK").and_then(|v| v.parse().ok()) {
            self.sandbox.enable_network = value;
        }
        if let Some(value) = get("ENABLE_PRELOAD").and_then(|v| v.parse().ok()) {
            self.sandbox.enable_preload = value;
        }
        if let Some(value) = get("ALLOWED_SYSCALLS") {
            let numbers: Result<Vec<i64>, _> =
                value.split(',').map(|s| s.trim().parse()).collect();
            if let Ok(numbers) = numbers {
                self.sandbox.allowed_syscalls = numbers;
            }
        }
        if self.sandbox.enable_network {
            info!("network has been enabled");
            if let Some(value) = get("SOCKS5_PROXY") {
                self.sandbox.proxy.socks5 = value;
            }
            if let Some(value) = get("HTTPS_PROXY") {
                self.sandbox.proxy.https = value;
            }
            if let Some(value) = get("HTTP_PROXY") {
                self.sandbox.proxy.http = value;
            }
        }
    }
}
