//! Execution dispatcher: the entry point from the HTTP layer into the
//! sandbox core.
//!
//! Validates request options against global policy before anything is
//! spawned, bridges onto a blocking task for the synchronous runner, and
//! assembles the response envelope only after the capture's `done` fires,
//! so no output can race the response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use snipbox_sandbox::capture;
use snipbox_sandbox::error::RunnerError;
use snipbox_sandbox::nodejs::NodeRunner;
use snipbox_sandbox::python::{deps, PythonRunner};
use snipbox_sandbox::{Dependency, Family, RunnerOptions, SandboxConfig};

use crate::http::{AppState, RunRequest};

pub const ERR_NETWORK_DISABLED: &str =
    "network is disabled, please enable it in the configuration";
pub const ERR_CUSTOM_DEPENDENCIES_DISABLED: &str =
    "custom dependencies are disabled, please enable it in the configuration";

/// Response envelope shared by every endpoint: `code == 0` means success,
/// negative codes are errors, `data` carries the payload.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".into(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: if code >= 0 { -1 } else { code },
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunData {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
pub struct DependenciesData {
    pub dependencies: Vec<Dependency>,
}

/// Run one snippet to completion and build its envelope.
pub async fn run_code(state: &AppState, req: RunRequest) -> Envelope<RunData> {
    let Some(family) = Family::from_language(&req.language) else {
        return Envelope::error(-400, format!("unsupported language: {}", req.language));
    };

    let options = RunnerOptions {
        enable_network: req.enable_network,
        dependencies: req.dependencies,
        files: req.files,
    };
    if let Err(message) = check_options(&state.sandbox, &options) {
        return Envelope::error(-400, message);
    }

    let preload = if state.sandbox.enable_preload {
        req.preload
    } else {
        String::new()
    };

    let language = family.as_str();
    let timeout = Duration::from_secs(state.config.worker_timeout);
    let sandbox = Arc::clone(&state.sandbox);
    let code = req.code;

    state.metrics.run_started(language);
    let started = Instant::now();
    let result =
        tokio::task::spawn_blocking(move || run_blocking(sandbox, family, &code, &preload, &options, timeout))
            .await;
    state.metrics.run_finished(language);

    match result {
        Ok(Ok((stdout, stderr))) => {
            let label = if stderr.is_empty() { "success" } else { "error" };
            state.metrics.observe_run(language, label, started.elapsed());
            info!(language, result = label, elapsed = ?started.elapsed(), "execution finished");
            Envelope::success(RunData { stdout, stderr })
        }
        Ok(Err(err)) => {
            state
                .metrics
                .observe_run(language, "error", started.elapsed());
            Envelope::error(-500, err.to_string())
        }
        Err(join_err) => {
            state
                .metrics
                .observe_run(language, "error", started.elapsed());
            Envelope::error(-500, join_err.to_string())
        }
    }
}

/// Reject requests that ask for globally disabled features before any
/// subprocess exists.
pub fn check_options(config: &SandboxConfig, options: &RunnerOptions) -> Result<(), &'static str> {
    if options.enable_network && !config.enable_network {
        return Err(ERR_NETWORK_DISABLED);
    }
    if !options.dependencies.is_empty() && !config.enable_custom_dependencies {
        return Err(ERR_CUSTOM_DEPENDENCIES_DISABLED);
    }
    Ok(())
}

fn run_blocking(
    config: Arc<SandboxConfig>,
    family: Family,
    code: &str,
    preload: &str,
    options: &RunnerOptions,
    timeout: Duration,
) -> Result<(String, String), RunnerError> {
    let handle = match family {
        Family::Python => PythonRunner::new(config).run(code, timeout, None, preload, options)?,
        Family::Nodejs => NodeRunner::new(config).run(code, timeout, None, options)?,
    };
    let (stdout, stderr) = capture::drain(handle);
    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

pub async fn list_dependencies() -> Envelope<DependenciesData> {
    Envelope::success(DependenciesData {
        dependencies: deps::list(),
    })
}

pub async fn update_dependencies(state: &AppState) -> Envelope<()> {
    let sandbox = Arc::clone(&state.sandbox);
    let result = tokio::task::spawn_blocking(move || deps::prepare(&sandbox)).await;
    match result {
        Ok(Ok(())) => Envelope::success(()),
        Ok(Err(err)) => Envelope::error(-500, err.to_string()),
        Err(join_err) => Envelope::error(-500, join_err.to_string()),
    }
}

pub async fn refresh_dependencies(state: &AppState) -> Envelope<DependenciesData> {
    let sandbox = Arc::clone(&state.sandbox);
    match tokio::task::spawn_blocking(move || deps::refresh(&sandbox)).await {
        Ok(dependencies) => Envelope::success(DependenciesData { dependencies }),
        Err(join_err) => Envelope::error(-500, join_err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_policy_is_checked_first() {
        let config = SandboxConfig::default();
        let options = RunnerOptions {
            enable_network: true,
            ..Default::default()
        };
        assert_eq!(check_options(&config, &options), Err(ERR_NETWORK_DISABLED));
    }

    #[test]
    fn custom_dependencies_require_opt_in() {
        let config = SandboxConfig::default();
        let options = RunnerOptions {
            dependencies: vec![Dependency {
                name: "numpy".into(),
                version: String::new(),
            }],
            ..Default::default()
        };
        assert_eq!(
            check_options(&config, &options),
            Err(ERR_CUSTOM_DEPENDENCIES_DISABLED)
        );
    }

    #[test]
    fn allowed_options_pass() {
        let config = SandboxConfig {
            enable_network: true,
            enable_custom_dependencies: true,
            ..Default::default()
        };
        let options = RunnerOptions {
            enable_network: true,
            dependencies: vec![Dependency {
                name: "numpy".into(),
                version: String::new(),
            }],
            ..Default::default()
        };
        assert_eq!(check_options(&config, &options), Ok(()));
    }

    #[test]
    fn envelope_codes() {
        let ok = Envelope::success(());
        assert_eq!(ok.code, 0);
        assert_eq!(ok.message, "success");

        let err = Envelope::<()>::error(-400, "bad");
        assert_eq!(err.code, -400);
        assert!(err.data.is_none());

        // Non-negative error codes are normalised.
        let err = Envelope::<()>::error(7, "odd");
        assert_eq!(err.code, -1);
    }
}
