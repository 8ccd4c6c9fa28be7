use crate::models::{ConversionResult, JobId, OutputFormat};
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Unsupported document: {0}")]
    Unsupported(String),

    #[error("Conversion rejected: {0}")]
    Rejected(String),

    #[error("Conversion engine unavailable: {0}")]
    Unavailable(String),

    #[error("Conversion failed: {0}")]
    Failed(String),

    #[error("Conversion cancelled")]
    Cancelled,
}

impl ConverterError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConverterError::Unavailable(_) | ConverterError::Failed(_))
    }
}

/// Everything the engine needs to convert one document.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: JobId,
    pub document_url: String,
    pub format: OutputFormat,
    pub request_id: Option<String>,
}

/// The external conversion engine.
///
/// Implementations should stop work and return [`ConverterError::Cancelled`] once
/// `cancel` fires; the worker pool fires it on timeout and on advisory cancellation
/// of a running job. Engines that ignore it are simply abandoned.
#[async_trait]
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<ConversionResult, ConverterError>;
}
