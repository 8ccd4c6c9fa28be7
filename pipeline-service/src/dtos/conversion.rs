use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConvertRequest {
    #[validate(
        length(min = 1, max = 2048, message = "document_url must be 1-2048 characters"),
        url(message = "document_url must be a well-formed URL")
    )]
    pub document_url: String,
    /// Target output format; the configured default is used when absent or blank.
    #[validate(length(max = 32, message = "format must be at most 32 characters"))]
    pub format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub job_id: String,
}
