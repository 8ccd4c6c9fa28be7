pub mod dispatcher;
pub mod metrics;
pub mod tracker;
pub mod validation;

pub use dispatcher::{CancelOutcome, JobDispatcher};
pub use metrics::{get_metrics, init_metrics};
pub use tracker::{JobFilter, StatusTracker};
pub use validation::{JobDraft, RequestValidator};
