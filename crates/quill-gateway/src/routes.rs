//! HTTP surface of the gateway.

use crate::AppState;
use crate::stream::{StreamError, open_stream};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use quill_proto::{JobId, JobSnapshot};
use serde_json::json;
use std::convert::Infallible;

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/stream", get(stream_job))
        .with_state(state)
}

/// `GET /jobs`: snapshots of every job the store knows.
async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.store.all_jobs())
}

/// `GET /jobs/{id}`: the full job record, transcript included.
async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let job_id = JobId::new(id);
    match state.store.get_job(&job_id) {
        Some(job) => Json(job).into_response(),
        None => not_found(&job_id, state.store.job_ids()),
    }
}

/// `GET /jobs/{id}/stream`: the SSE push stream for one viewer.
async fn stream_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match open_stream(&state, JobId::new(id)).await {
        Ok(events) => {
            let stream = events.map(|event| Ok::<_, Infallible>(event.into_sse()));
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(StreamError::JobNotFound { job_id, known_jobs }) => not_found(&job_id, known_jobs),
    }
}

/// 404 body that names the missing job and every id the store knows,
/// so a mistyped id is diagnosable from the response alone.
fn not_found(job_id: &JobId, known_jobs: Vec<JobId>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("job not found: {job_id}"),
            "known_jobs": known_jobs,
        })),
    )
        .into_response()
}
