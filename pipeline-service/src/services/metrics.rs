//! Prometheus recorder for the job metrics emitted by the dispatcher and workers.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Conversions range from sub-second passthroughs to multi-minute engine runs.
const JOB_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0];

/// Install the global Prometheus recorder.
///
/// Must run once, before anything records a metric. Panics on a second call.
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("conversion_job_duration".to_string()),
            JOB_DURATION_BUCKETS,
        )
        .expect("invalid histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    describe_counter!("conversion_jobs_submitted", "Jobs accepted into the queue");
    describe_counter!(
        "conversion_jobs_rejected",
        "Submissions refused because the queue was full"
    );
    describe_counter!("conversion_jobs_started", "Jobs picked up by a worker");
    describe_counter!("conversion_jobs_succeeded", "Jobs that produced a result");
    describe_counter!("conversion_jobs_failed", "Jobs that ended in failure, by reason");
    describe_counter!("conversion_retries", "Converter attempts retried after a failure");
    describe_histogram!(
        "conversion_job_duration",
        Unit::Seconds,
        "Time from a worker starting a job to its success"
    );
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}
