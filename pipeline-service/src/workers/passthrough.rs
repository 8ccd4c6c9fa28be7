use crate::models::ConversionResult;
use crate::workers::converter::{ConversionRequest, Converter, ConverterError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Converter used when no engine is configured.
///
/// Performs no transformation: the source URL is reported back as the output
/// location in the requested format.
#[derive(Default)]
pub struct PassthroughConverter {
    convert_count: AtomicU64,
}

impl PassthroughConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_count(&self) -> u64 {
        self.convert_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for PassthroughConverter {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<ConversionResult, ConverterError> {
        if cancel.is_cancelled() {
            return Err(ConverterError::Cancelled);
        }

        self.convert_count.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            job_id = %request.job_id,
            document_url = %request.document_url,
            format = %request.format,
            "[PASSTHROUGH] Document echoed without conversion"
        );

        Ok(ConversionResult {
            location: request.document_url.clone(),
            format: request.format,
            size_bytes: None,
        })
    }
}
