pub mod health;
pub mod jobs;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use jobs::{cancel_job, convert, get_job_status, list_jobs};
