use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Invalid job state: {}", s)),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target representation requested from the conversion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Text,
    Html,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Text => "text",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "text" | "txt" => Ok(OutputFormat::Text),
            "html" => Ok(OutputFormat::Html),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unsupported output format: {}", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output produced by the conversion engine for a succeeded job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub location: String,
    pub format: OutputFormat,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    Timeout,
    ConversionFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Cancelled => "cancelled",
            FailureReason::Timeout => "timeout",
            FailureReason::ConversionFailure => "conversion_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl JobFailure {
    pub fn cancelled() -> Self {
        Self {
            reason: FailureReason::Cancelled,
            message: "Job cancelled before a worker picked it up".to_string(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            reason: FailureReason::Timeout,
            message: message.into(),
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self {
            reason: FailureReason::ConversionFailure,
            message: message.into(),
        }
    }
}

/// A state change requested through the status tracker.
///
/// Each transition is only legal from exactly one source state:
/// `Start` and `Cancel` from `Pending`, `Succeed` and `Fail` from `Running`.
#[derive(Debug, Clone)]
pub enum Transition {
    Start,
    Succeed(ConversionResult),
    Fail(JobFailure),
    Cancel,
}

impl Transition {
    pub fn source(&self) -> JobState {
        match self {
            Transition::Start | Transition::Cancel => JobState::Pending,
            Transition::Succeed(_) | Transition::Fail(_) => JobState::Running,
        }
    }

    pub fn target(&self) -> JobState {
        match self {
            Transition::Start => JobState::Running,
            Transition::Succeed(_) => JobState::Succeeded,
            Transition::Fail(_) | Transition::Cancel => JobState::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub document_url: String,
    pub format: OutputFormat,
    pub state: JobState,
    pub result: Option<ConversionResult>,
    pub error: Option<JobFailure>,
    pub attempts: u32,
    #[serde(skip)]
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversionJob {
    pub fn new(document_url: String, format: OutputFormat, request_id: Option<String>) -> Self {
        Self {
            id: JobId::new(),
            document_url,
            format,
            state: JobState::Pending,
            result: None,
            error: None,
            attempts: 0,
            request_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply `transition` in place. Returns the current state unchanged as the
    /// error when the transition is not legal from it.
    pub fn apply(&mut self, transition: Transition) -> Result<(), JobState> {
        if self.state != transition.source() {
            return Err(self.state);
        }

        let now = Utc::now();
        self.state = transition.target();

        match transition {
            Transition::Start => {
                self.started_at = Some(now);
            }
            Transition::Succeed(result) => {
                self.result = Some(result);
                self.completed_at = Some(now);
            }
            Transition::Fail(failure) => {
                self.error = Some(failure);
                self.completed_at = Some(now);
            }
            Transition::Cancel => {
                self.error = Some(JobFailure::cancelled());
                self.completed_at = Some(now);
            }
        }

        Ok(())
    }
}
