pub mod conversion;
pub mod jobs;

pub use conversion::{ConvertRequest, ConvertResponse};
pub use jobs::{CancelResponse, JobListParams, JobListResponse, JobStatusResponse};
