use crate::models::{JobId, JobState};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Pending queue is full ({capacity} jobs)")]
    CapacityExceeded { capacity: usize },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("Job {job_id} is already {state}")]
    AlreadyTerminal { job_id: JobId, state: JobState },

    #[error("Job queue is closed")]
    QueueClosed,
}

/// Seconds a client is asked to wait before resubmitting after backpressure.
const RETRY_AFTER_SECS: u64 = 1;

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(errors) => AppError::ValidationError(errors),
            PipelineError::CapacityExceeded { .. } => {
                AppError::TooManyRequests(err.to_string(), Some(RETRY_AFTER_SECS))
            }
            PipelineError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err)),
            PipelineError::AlreadyTerminal { .. } => AppError::Conflict(anyhow::anyhow!(err)),
            PipelineError::InvalidTransition { .. } => AppError::InternalError(anyhow::anyhow!(err)),
            PipelineError::QueueClosed => AppError::ServiceUnavailable,
        }
    }
}
