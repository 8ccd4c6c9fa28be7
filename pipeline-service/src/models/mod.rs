mod job;

pub use job::{
    ConversionJob, ConversionResult, FailureReason, JobFailure, JobId, JobState, OutputFormat,
    Transition,
};
