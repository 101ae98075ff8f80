//! Error types for the execution core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before a child process has been spawned.
///
/// Anything that happens after spawn is folded into the stderr stream by the
/// capture supervisor instead of being returned here.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("interpreter not found: {0}")]
    InterpreterMissing(PathBuf),

    #[error("failed to assemble ephemeral root: {0}")]
    Rootfs(std::io::Error),

    #[error("virtual environment setup failed: {0}")]
    Venv(String),

    #[error("dependency install failed: {0}")]
    DependencyInstall(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
