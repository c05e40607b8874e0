//! HTTP route handlers for the autosave API.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use autosave::core::config::AutosaveConfig;
use autosave::cycle::{CycleOutcome, Trigger};
use autosave::runtime::RuntimeSnapshot;

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/autosave", get(get_autosave).post(update_autosave))
        .route("/autosave/run", post(run_autosave))
}

/// Error body `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("{err:#}"),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    ok: bool,
    git_auto_save: RuntimeSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveResponse {
    git_auto_save: AutosaveConfig,
    runtime: RuntimeSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    #[serde(flatten)]
    outcome: CycleOutcome,
    git_auto_save: AutosaveConfig,
}

/// GET /api/health - liveness plus scheduler state.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        git_auto_save: state.autosave.snapshot(),
    })
}

/// GET /api/autosave - persisted configuration and runtime state.
async fn get_autosave(State(state): State<AppState>) -> Result<Json<AutosaveResponse>, ApiError> {
    let autosave = Arc::clone(&state.autosave);
    let config = blocking(move || autosave.config())
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(AutosaveResponse {
        git_auto_save: config,
        runtime: state.autosave.snapshot(),
    }))
}

/// POST /api/autosave - merge a configuration patch and resync the timer.
///
/// The body is either the patch itself or `{"gitAutoSave": patch}`.
async fn update_autosave(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AutosaveResponse>, ApiError> {
    let patch = parse_patch(&body).map_err(ApiError::bad_request)?;
    let autosave = Arc::clone(&state.autosave);
    let saved = blocking(move || autosave.apply_patch(&patch))
        .await
        .map_err(|err| {
            warn!(err = %format!("{err:#}"), "configuration update failed");
            ApiError::bad_request(err)
        })?;
    info!(enabled = saved.enabled, "autosave configuration updated");
    Ok(Json(AutosaveResponse {
        git_auto_save: saved,
        runtime: state.autosave.snapshot(),
    }))
}

/// POST /api/autosave/run - run one forced cycle now.
async fn run_autosave(State(state): State<AppState>) -> Result<Json<RunResponse>, ApiError> {
    let autosave = Arc::clone(&state.autosave);
    let (outcome, config) = blocking(move || {
        let outcome = autosave.run_once(Trigger::Manual);
        Ok((outcome, autosave.config()?))
    })
    .await
    .map_err(ApiError::internal)?;
    Ok(Json(RunResponse {
        outcome,
        git_auto_save: config,
    }))
}

fn parse_patch(body: &[u8]) -> anyhow::Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    let body: Value = serde_json::from_slice(body).context("invalid JSON body")?;
    Ok(match body.get("gitAutoSave") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => body,
    })
}

/// Run store and git work off the async executor.
async fn blocking<T, F>(work: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("blocking task failed")?
}
