use crate::config::FormatConfig;
use crate::dtos::ConvertRequest;
use crate::error::PipelineError;
use crate::models::OutputFormat;
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

/// A request that passed validation and is ready to become a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDraft {
    pub document_url: String,
    pub format: OutputFormat,
    pub request_id: Option<String>,
}

/// Checks conversion requests against the URL and format constraints.
///
/// Validation is pure: it never touches the tracker or the queue.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    formats: FormatConfig,
}

impl RequestValidator {
    pub fn new(formats: FormatConfig) -> Self {
        Self { formats }
    }

    pub fn validate(
        &self,
        request: ConvertRequest,
        request_id: Option<String>,
    ) -> Result<JobDraft, PipelineError> {
        let mut errors = match request.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        let document_url = request.document_url.trim().to_string();
        if !errors.field_errors().contains_key("document_url") && !has_http_scheme(&document_url)
        {
            errors.add(
                "document_url",
                error("scheme", "document_url must use http or https"),
            );
        }

        let format = match request.format.as_deref().map(str::trim) {
            None | Some("") => Some(self.formats.default),
            Some(raw) => match raw.parse::<OutputFormat>() {
                Ok(format) if self.formats.supported.contains(&format) => Some(format),
                _ => {
                    errors.add(
                        "format",
                        error(
                            "unsupported_format",
                            format!(
                                "format '{}' is not supported; expected one of: {}",
                                raw,
                                self.supported_list()
                            ),
                        ),
                    );
                    None
                }
            },
        };

        match format {
            Some(format) if errors.is_empty() => Ok(JobDraft {
                document_url,
                format,
                request_id,
            }),
            _ => Err(PipelineError::Validation(errors)),
        }
    }

    fn supported_list(&self) -> String {
        self.formats
            .supported
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}
