use crate::dtos::{
    CancelResponse, ConvertRequest, ConvertResponse, JobListParams, JobListResponse,
    JobStatusResponse,
};
use crate::error::PipelineError;
use crate::models::JobId;
use crate::services::{CancelOutcome, JobFilter};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use service_core::observability::extract_request_id;

pub async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    // Malformed bodies are client input errors like any other validation failure.
    let Json(request) = payload.map_err(|rejection| {
        AppError::BadRequest(anyhow::anyhow!(rejection.body_text()))
    })?;

    let draft = state
        .validator
        .validate(request, extract_request_id(&headers))?;
    let job_id = state.dispatcher.submit(draft)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            job_id: job_id.to_string(),
        }),
    ))
}

pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.tracker.get(&job_id)?;

    Ok(Json(JobStatusResponse::from(job)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = JobFilter::from(params);
    let jobs: Vec<JobStatusResponse> = state
        .tracker
        .list(&filter)
        .into_iter()
        .map(JobStatusResponse::from)
        .collect();

    let total = jobs.len();
    Ok(Json(JobListResponse { jobs, total }))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&job_id)?;

    let (status, job, message) = match state.dispatcher.cancel(&job_id)? {
        CancelOutcome::Cancelled(job) => (StatusCode::OK, job, "Job cancelled"),
        CancelOutcome::Signalled(job) => (
            StatusCode::ACCEPTED,
            job,
            "Job is running; cancellation requested",
        ),
    };

    Ok((
        status,
        Json(CancelResponse {
            job_id: job.id.to_string(),
            state: job.state,
            message: message.to_string(),
        }),
    ))
}

/// Identifiers that are not well-formed can never name a job.
fn parse_job_id(raw: &str) -> Result<JobId, PipelineError> {
    raw.parse()
        .map_err(|_| PipelineError::NotFound(raw.to_string()))
}
