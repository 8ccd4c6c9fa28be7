use crate::models::{ConversionResult, JobId, OutputFormat};
use crate::workers::converter::{ConversionRequest, Converter, ConverterError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    job_id: JobId,
    document_url: &'a str,
    format: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct EngineResponse {
    location: String,
    #[serde(default)]
    size_bytes: Option<u64>,
}

/// Converter backed by a remote conversion engine reached over HTTP.
///
/// Calls carry no deadline of their own; the worker pool bounds each attempt and
/// reports an expired deadline as a timeout.
pub struct HttpConverter {
    client: Client,
    endpoint: String,
}

impl HttpConverter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn post(&self, request: &ConversionRequest) -> Result<ConversionResult, ConverterError> {
        let body = EngineRequest {
            job_id: request.job_id,
            document_url: &request.document_url,
            format: request.format,
        };

        let response = self
            .client
            .traced_post(&self.endpoint)
            .json(&body)
            .send_with_request_id(request.request_id.as_deref())
            .await
            .map_err(|e| ConverterError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        let engine: EngineResponse = response
            .json()
            .await
            .map_err(|e| ConverterError::Failed(format!("Invalid engine response: {}", e)))?;

        Ok(ConversionResult {
            location: engine.location,
            format: request.format,
            size_bytes: engine.size_bytes,
        })
    }
}

fn classify_status(status: StatusCode, detail: String) -> ConverterError {
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, detail)
    };

    match status {
        StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => {
            ConverterError::Unsupported(message)
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ConverterError::Unavailable(message)
        }
        s if s.is_client_error() => ConverterError::Rejected(message),
        _ => ConverterError::Unavailable(message),
    }
}

#[async_trait]
impl Converter for HttpConverter {
    fn name(&self) -> &str {
        "http"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<ConversionResult, ConverterError> {
        tracing::debug!(
            job_id = %request.job_id,
            endpoint = %self.endpoint,
            "Calling conversion engine"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %request.job_id, "Engine call abandoned");
                Err(ConverterError::Cancelled)
            }
            result = self.post(request) => result,
        }
    }
}
