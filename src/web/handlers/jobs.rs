// POST /jobs: queue items for background moderation (202 + job ids).
// GET /jobs/{id}: current state of one job.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::RequestOptions;
use crate::jobs::JobId;
use crate::pipeline::{parse_batch, BatchItem};
use crate::web::{api_error, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct JobsRequest {
    pub items: Vec<BatchItem>,
    #[serde(flatten)]
    pub options: RequestOptions,
}

pub async fn submit_jobs(
    State(state): State<AppState>,
    Json(req): Json<JobsRequest>,
) -> Result<Response, ApiError> {
    let items = parse_batch(req.items)?;
    let ids = state.jobs.submit_batch(items, req.options.into()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "jobs": ids })),
    )
        .into_response())
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = id.parse::<JobId>() else {
        return api_error(StatusCode::BAD_REQUEST, "validation_error", "invalid job id");
    };
    match state.jobs.status(&id) {
        Some(status) => Json(serde_json::json!({ "id": id, "status": status })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "not_found", "unknown job id"),
    }
}
