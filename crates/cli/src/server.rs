//! HTTP front end for the dubbing pipeline.
//!
//! `POST /dub` runs one request to completion and answers with the URL of
//! the dubbed video plus the stages that ran. Session directories are served
//! read-only under `/temp`, so that URL can be fetched directly. Failures come
//! back as `{"error": {"stage": ..., "message": ...}}`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use autodub_core::{DubError, DubOutcome, DubRequest, Dubber};

/// Route prefix under which session directories are served.
pub const FILES_ROUTE: &str = "/temp";

#[derive(Clone)]
struct AppState {
    dubber: Arc<Dubber>,
}

#[derive(Debug, Deserialize)]
struct DubBody {
    url: String,
    target_lang: String,
    #[serde(default)]
    clone_voice: bool,
    #[serde(default)]
    keep_background: bool,
}

impl DubBody {
    fn into_request(self) -> Result<DubRequest, ApiError> {
        let url = self.url.trim();
        let target_lang = self.target_lang.trim();
        if url.is_empty() {
            return Err(ApiError::bad_request("url must not be empty"));
        }
        if target_lang.is_empty() {
            return Err(ApiError::bad_request("target_lang must not be empty"));
        }
        Ok(DubRequest {
            source_url: url.to_string(),
            target_lang: target_lang.to_string(),
            clone_voice: self.clone_voice,
            keep_background: self.keep_background,
        })
    }
}

#[derive(Debug, Serialize)]
struct DubReply {
    session_id: String,
    output_url: String,
    steps: Vec<&'static str>,
}

impl From<&DubOutcome> for DubReply {
    fn from(outcome: &DubOutcome) -> Self {
        let file = outcome
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            session_id: outcome.session_id.clone(),
            output_url: format!("{}/{}/{}", FILES_ROUTE, outcome.session_id, file),
            steps: outcome.stages.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// Error response tagged with the stage that failed.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    stage: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            stage: "request",
            message: message.into(),
        }
    }
}

impl From<DubError> for ApiError {
    fn from(err: DubError) -> Self {
        // Provider failures are upstream problems; the rest are ours
        let status = match &err {
            DubError::Download(_)
            | DubError::Transcription(_)
            | DubError::Translation { .. }
            | DubError::Synthesis { .. }
            | DubError::Cloning { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            stage: "request",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "stage": self.stage, "message": self.message },
        });
        (self.status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn dub(
    State(state): State<AppState>,
    payload: Result<Json<DubBody>, JsonRejection>,
) -> Result<Json<DubReply>, ApiError> {
    let Json(body) = payload?;
    let request = body.into_request()?;
    log::info!("Dub request: {} -> {}", request.source_url, request.target_lang);

    // The pipeline blocks on subprocesses and HTTP for minutes
    let dubber = Arc::clone(&state.dubber);
    let outcome = tokio::task::spawn_blocking(move || dubber.dub(&request))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            stage: "request",
            message: format!("Dubbing task panicked: {}", e),
        })?
        .map_err(|e| {
            log::error!("Dub request failed: {}", e);
            ApiError::from(e)
        })?;

    log::info!("Session {} done: {}", outcome.session_id, outcome.output_path.display());
    Ok(Json(DubReply::from(&outcome)))
}

/// Routes: `POST /dub`, `GET /health`, and the work directory under `/temp`.
pub fn router(dubber: Arc<Dubber>) -> Router {
    let files = ServeDir::new(&dubber.config().work_dir);
    Router::new()
        .route("/health", get(health))
        .route("/dub", post(dub))
        .nest_service(FILES_ROUTE, files)
        .layer(CorsLayer::permissive())
        .with_state(AppState { dubber })
}

/// Serve until Ctrl+C.
pub async fn serve(addr: SocketAddr, dubber: Arc<Dubber>) -> Result<()> {
    let work_dir = dubber.config().work_dir.clone();
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory: {}", work_dir.display()))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!(
        "Listening on http://{} (serving {} at {})",
        listener.local_addr()?,
        work_dir.display(),
        FILES_ROUTE
    );

    axum::serve(listener, router(dubber))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Shutting down");
            }
        })
        .await
        .context("Server error")
}
