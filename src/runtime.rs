use crate::{
    auth::{api_key_auth, ApiKey},
    engine::{
        events::ExecutionEvent, extract_code_block, run::run_collected, summary::ExecutionSummary,
        ExecutionMode,
    },
    execution_id::ExecutionId,
    tasks::{backend, dsa, frontend, TaskContext},
};

use axum::debug_handler;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Span;

/* ---------------- state ---------------- */

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<TaskContext>,
    pub services: backend::ServiceRegistry,
}

impl AppState {
    pub fn new(tasks: TaskContext) -> Self {
        Self {
            tasks: Arc::new(tasks),
            services: backend::ServiceRegistry::new(),
        }
    }
}

/* ---------------- server ---------------- */

pub fn router(state: AppState, key: ApiKey) -> Router {
    let protected = Router::new()
        .route("/validate", post(validate))
        .route("/execute", post(execute))
        .route("/extract", post(extract))
        .route("/tasks/frontend", post(task_frontend))
        .route("/tasks/backend", post(task_backend))
        .route("/tasks/dsa", post(task_dsa))
        .route("/services", get(list_services))
        .route("/services/:id/stop", post(stop_service))
        .layer(middleware::from_fn_with_state(key, api_key_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = res.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "request completed"
                    );
                }),
        )
}

pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let key = ApiKey::from_env();
    if !key.is_configured() {
        tracing::warn!(
            "{} is not set; protected routes will answer 500",
            crate::auth::API_KEY_ENV
        );
    }

    let services = state.services.clone();
    let app = router(state, key);

    let socket: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(socket).await?;

    tracing::info!("devagent panel listening on http://{}", socket);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // launched services must not outlive the panel, even on a server error
    services.stop_all().await;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/* ---------------- request models ---------------- */

#[derive(Debug, Deserialize)]
struct CodeRequest {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    code: String,
    #[serde(default)]
    mode: ExecutionMode,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    summary: ExecutionSummary,
    text: String,
    events: Vec<ExecutionEvent>,
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    reply: String,
    #[serde(default = "default_lang")]
    lang: String,
}

fn default_lang() -> String {
    "python".to_string()
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    description: String,
}

fn error_response(e: anyhow::Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "ok": false,
            "error": format!("{:#}", e),
        })),
    )
        .into_response()
}

/* ---------------- endpoints ---------------- */

async fn health() -> &'static str {
    "ok"
}

#[debug_handler]
async fn validate(State(state): State<AppState>, Json(req): Json<CodeRequest>) -> impl IntoResponse {
    Json(state.tasks.validator.validate(&req.code))
}

/// Per-request timeout: absent means the configured default, zero is
/// refused, anything above `execution.max_timeout_secs` is capped.
fn request_timeout(requested: Option<u64>, max_secs: u64) -> anyhow::Result<Option<Duration>> {
    match requested {
        None => Ok(None),
        Some(0) => anyhow::bail!("timeout_secs must be greater than zero"),
        Some(secs) if secs > max_secs => {
            tracing::debug!(requested = secs, max_secs, "capping requested timeout");
            Ok(Some(Duration::from_secs(max_secs)))
        }
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
    }
}

#[debug_handler]
async fn execute(State(state): State<AppState>, Json(req): Json<ExecuteRequest>) -> Response {
    let max_secs = state.tasks.config.execution.max_timeout_secs;
    let timeout = match request_timeout(req.timeout_secs, max_secs) {
        Ok(t) => t,
        Err(e) => return error_response(e),
    };

    let (summary, sink) = run_collected(
        &state.tasks.validator,
        &state.tasks.executor,
        &req.code,
        req.mode,
        timeout,
    )
    .await;

    Json(ExecuteResponse {
        text: summary.render_text(),
        summary,
        events: sink.into_events(),
    })
    .into_response()
}

async fn extract(Json(req): Json<ExtractRequest>) -> impl IntoResponse {
    Json(serde_json::json!({
        "code": extract_code_block(&req.reply, &req.lang),
    }))
}

#[debug_handler]
async fn task_frontend(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Response {
    match frontend::generate_page(&state.tasks, &req.description).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

#[debug_handler]
async fn task_backend(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Response {
    match backend::launch_api(&state.tasks, &state.services, &req.description).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

#[debug_handler]
async fn task_dsa(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Response {
    match dsa::solve(&state.tasks, &req.description).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.services.list().await)
}

async fn stop_service(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.services.stop(&ExecutionId(id)).await {
        Ok(true) => Json(serde_json::json!({ "ok": true })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "ok": false, "error": "Unknown service" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
