//! HTTP surface: router, auth, request decoding.
//!
//! Thin by design - every handler decodes, runs through the limiter, and
//! delegates to the dispatcher. HTTP status is 200 with the body carrying
//! the result code, except 503 for the admission gate and 401 for auth.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use snipbox_sandbox::{Dependency, SandboxConfig};

use crate::config::Config;
use crate::limits::Limiter;
use crate::metrics::Metrics;
use crate::service::{self, Envelope, RunData};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sandbox: Arc<SandboxConfig>,
    pub metrics: Arc<Metrics>,
    pub limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let limiter = Limiter::new(config.max_requests, config.max_workers);
        let sandbox = Arc::new(config.sandbox.clone());
        Self {
            config: Arc::new(config),
            sandbox,
            metrics: Arc::new(Metrics::new()),
            limiter: Arc::new(limiter),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub preload: String,
    #[serde(default)]
    pub enable_network: bool,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/run", post(run))
        .route("/dependencies", get(list_dependencies))
        .route("/dependencies/update", post(update_dependencies))
        .route("/dependencies/refresh", get(refresh_dependencies))
        .layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/v1/sandbox", protected)
        .with_state(state)
}

async fn health() -> Json<&'static str> {
    Json("ok")
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

async fn auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get("X-Api-Key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented != state.config.app.key {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(req).await
}

async fn run(
    State(state): State<AppState>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return Json(Envelope::<RunData>::error(-400, rejection.body_text())).into_response();
        }
    };

    // Admission before worker acquisition: a flood is bounced here instead
    // of queueing inside the semaphore.
    let Some(_admission) = state.limiter.try_admit() else {
        state.metrics.request_rejected();
        warn!("request rejected: admission gate full");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Envelope::<RunData>::error(-503, "too many requests")),
        )
            .into_response();
    };
    state.metrics.request_admitted();

    let _worker = state.limiter.acquire_worker().await;
    state.metrics.worker_acquired();

    let envelope = service::run_code(&state, req).await;

    state.metrics.worker_released();
    state.metrics.request_finished();
    Json(envelope).into_response()
}

#[derive(Debug, Deserialize)]
struct DependenciesQuery {
    #[serde(default)]
    language: String,
}

async fn list_dependencies(Query(query): Query<DependenciesQuery>) -> Response {
    if query.language != "python3" {
        return Json(Envelope::<()>::error(
            -400,
            format!("unsupported language: {}", query.language),
        ))
        .into_response();
    }
    Json(service::list_dependencies().await).into_response()
}

async fn update_dependencies(State(state): State<AppState>) -> Response {
    Json(service::update_dependencies(&state).await).into_response()
}

async fn refresh_dependencies(State(state): State<AppState>) -> Response {
    Json(service::refresh_dependencies(&state).await).into_response()
}
