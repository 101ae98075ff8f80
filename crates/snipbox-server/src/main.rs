//! snipbox: HTTP-fronted code-execution sandbox.
//!
//! Accepts Python and Node snippets over HTTP and executes each one in a
//! seccomp-confined, chrooted, unprivileged subprocess.

#[cfg(not(target_os = "linux"))]
compile_error!("snipbox only works on Linux.");

mod config;
mod http;
mod limits;
mod metrics;
mod service;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use snipbox_sandbox::python::deps;

use crate::config::Config;
use crate::http::AppState;

#[derive(Parser, Debug)]
#[command(name = "snipbox")]
#[command(about = "HTTP-fronted code-execution sandbox")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "conf/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(if config.app.debug {
            "debug"
        } else {
            "info"
        }))
        .init();
    info!(config = %args.config.display(), "configuration loaded");

    let state = AppState::new(config);

    prepare_dependencies(&state).await?;
    spawn_dependency_refresher(Arc::clone(&state.sandbox));

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.app.port));
    info!(%addr, "starting sandbox server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, http::router(state))
        .await
        .context("server exited")?;
    Ok(())
}

/// Build the hermetic Python library tree before accepting requests.
/// Startup-time failure here is fatal: a sandbox without its library
/// shadow would kill every import under the filter.
async fn prepare_dependencies(state: &AppState) -> anyhow::Result<()> {
    info!("initializing python dependency environment");
    let sandbox = Arc::clone(&state.sandbox);
    tokio::task::spawn_blocking(move || deps::prepare(&sandbox))
        .await
        .context("dependency preparation task failed")?
        .context("failed to prepare python dependency environment")?;
    info!("python dependency environment initialized");
    Ok(())
}

/// Periodically reinstall the requirements manifest to keep the tree
/// fresh. Interval comes from configuration, default 30 minutes.
fn spawn_dependency_refresher(sandbox: Arc<snipbox_sandbox::SandboxConfig>) {
    let interval = sandbox.deps_update_interval();
    thread::spawn(move || loop {
        thread::sleep(interval);
        let updated = deps::refresh(&sandbox);
        info!(count = updated.len(), "python dependencies refreshed");
    });
}
