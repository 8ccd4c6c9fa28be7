use crate::models::{ConversionJob, ConversionResult, JobFailure, JobState, OutputFormat};
use crate::services::JobFilter;
use serde::{Deserialize, Serialize};

/// Wire view of a job as returned by `/status/{job_id}` and `/jobs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub document_url: String,
    pub format: OutputFormat,
    pub attempts: u32,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<ConversionJob> for JobStatusResponse {
    fn from(job: ConversionJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            state: job.state,
            result: job.result,
            error: job.error,
            document_url: job.document_url,
            format: job.format,
            attempts: job.attempts,
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct JobListParams {
    pub state: Option<JobState>,
    pub limit: Option<usize>,
}

impl From<JobListParams> for JobFilter {
    fn from(params: JobListParams) -> Self {
        Self {
            state: params.state,
            limit: Some(params.limit.unwrap_or(100).clamp(1, 1000)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatusResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub state: JobState,
    pub message: String,
}
