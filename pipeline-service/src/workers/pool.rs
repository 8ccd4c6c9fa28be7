use crate::config::WorkerConfig;
use crate::models::{ConversionResult, FailureReason, JobFailure, JobId, JobState, Transition};
use crate::services::StatusTracker;
use crate::workers::converter::{ConversionRequest, Converter, ConverterError};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancellation handles of the jobs workers are currently holding.
pub type InFlight = Arc<DashMap<JobId, CancellationToken>>;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<JobId>>>;

pub struct WorkerPool {
    config: WorkerConfig,
    tracker: StatusTracker,
    converter: Arc<dyn Converter>,
    in_flight: InFlight,
    job_rx: Option<mpsc::Receiver<JobId>>,
    shutdown_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create the pool and the bounded queue feeding it. The returned sender is
    /// the only way work reaches the workers.
    pub fn new(
        config: WorkerConfig,
        tracker: StatusTracker,
        converter: Arc<dyn Converter>,
    ) -> (Self, mpsc::Sender<JobId>) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_size.max(1));

        let pool = Self {
            config,
            tracker,
            converter,
            in_flight: Arc::new(DashMap::new()),
            job_rx: Some(job_rx),
            shutdown_token: CancellationToken::new(),
            handles: Vec::new(),
        };

        (pool, job_tx)
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    pub fn start(&mut self) {
        if !self.config.enabled {
            tracing::info!("Worker pool disabled by configuration");
            return;
        }

        let Some(job_rx) = self.job_rx.take() else {
            tracing::warn!("Worker pool already started");
            return;
        };
        let job_rx: SharedReceiver = Arc::new(Mutex::new(job_rx));

        tracing::info!(
            worker_count = self.config.worker_count,
            queue_size = self.config.queue_size,
            converter = self.converter.name(),
            "Starting worker pool"
        );

        for worker_id in 0..self.config.worker_count {
            let worker = Worker {
                id: worker_id,
                config: self.config.clone(),
                tracker: self.tracker.clone(),
                converter: self.converter.clone(),
                in_flight: self.in_flight.clone(),
                shutdown: self.shutdown_token.clone(),
            };
            self.handles.push(tokio::spawn(worker.run(job_rx.clone())));
        }
    }

    /// Stop taking new work, cancel running conversions and wait for every
    /// worker to exit. The queue is closed once this returns.
    pub async fn shutdown(self) {
        tracing::info!("Initiating worker pool shutdown");
        self.shutdown_token.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }

        tracing::info!("Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    config: WorkerConfig,
    tracker: StatusTracker,
    converter: Arc<dyn Converter>,
    in_flight: InFlight,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self, job_rx: SharedReceiver) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                job = async { job_rx.lock().await.recv().await } => job,
            };

            let Some(job_id) = next else {
                break;
            };

            self.process_job(job_id).await;
        }

        tracing::debug!(worker_id = self.id, "Worker exiting");
    }

    async fn process_job(&self, job_id: JobId) {
        // Registered before the job turns Running so a cancel never sees a
        // running job without a handle.
        let token = self.shutdown.child_token();
        self.in_flight.insert(job_id, token.clone());

        let job = match self.tracker.update(&job_id, Transition::Start) {
            Ok(job) => job,
            Err(e) => {
                self.in_flight.remove(&job_id);
                tracing::debug!(
                    worker_id = self.id,
                    job_id = %job_id,
                    error = %e,
                    "Skipping job that is no longer pending"
                );
                return;
            }
        };

        let start = Instant::now();
        metrics::counter!("conversion_jobs_started", "format" => job.format.as_str())
            .increment(1);

        tracing::info!(
            worker_id = self.id,
            job_id = %job_id,
            format = %job.format,
            "Conversion started"
        );

        let request = ConversionRequest {
            job_id,
            document_url: job.document_url,
            format: job.format,
            request_id: job.request_id,
        };

        let transition = match self.convert_with_retry(&request, &token).await {
            Ok(result) => Transition::Succeed(result),
            Err(failure) => Transition::Fail(failure),
        };

        match self.tracker.update(&job_id, transition) {
            Ok(job) if job.state == JobState::Succeeded => {
                metrics::counter!("conversion_jobs_succeeded", "format" => job.format.as_str())
                    .increment(1);
                metrics::histogram!("conversion_job_duration", "format" => job.format.as_str())
                    .record(start.elapsed().as_secs_f64());

                tracing::info!(
                    worker_id = self.id,
                    job_id = %job_id,
                    attempts = job.attempts,
                    duration_ms = start.elapsed().as_millis(),
                    "Conversion succeeded"
                );
            }
            Ok(job) => {
                let reason = job
                    .error
                    .as_ref()
                    .map(|e| e.reason)
                    .unwrap_or(FailureReason::ConversionFailure);
                metrics::counter!("conversion_jobs_failed", "reason" => reason.as_str())
                    .increment(1);

                tracing::error!(
                    worker_id = self.id,
                    job_id = %job_id,
                    attempts = job.attempts,
                    reason = reason.as_str(),
                    error = job.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default(),
                    "Conversion failed"
                );
            }
            Err(e) => {
                tracing::error!(
                    worker_id = self.id,
                    job_id = %job_id,
                    error = %e,
                    "Failed to record conversion outcome"
                );
            }
        }

        self.in_flight.remove(&job_id);
    }

    async fn convert_with_retry(
        &self,
        request: &ConversionRequest,
        token: &CancellationToken,
    ) -> Result<ConversionResult, JobFailure> {
        let mut backoff = self.backoff();
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.conversion_timeout();

        loop {
            let attempt = self
                .tracker
                .record_attempt(&request.job_id)
                .map_err(|e| JobFailure::conversion(e.to_string()))?;

            // Cancelling a running job only signals the converter; the attempt
            // ends when the converter returns or the deadline passes.
            let attempt_token = token.child_token();
            let outcome = tokio::time::timeout(
                timeout,
                self.converter.convert(request, attempt_token.clone()),
            )
            .await;

            let error = match outcome {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_) => {
                    attempt_token.cancel();
                    return Err(JobFailure::timeout(format!(
                        "Converter did not respond within {}ms",
                        timeout.as_millis()
                    )));
                }
            };

            if matches!(error, ConverterError::Cancelled) {
                return Err(interrupted());
            }

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(JobFailure::conversion(error.to_string()));
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| self.config.max_backoff());

            metrics::counter!("conversion_retries").increment(1);
            tracing::warn!(
                worker_id = self.id,
                job_id = %request.job_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis(),
                error = %error,
                "Conversion attempt failed, retrying"
            );

            tokio::select! {
                _ = token.cancelled() => return Err(interrupted()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff())
            .with_max_interval(self.config.max_backoff())
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

fn interrupted() -> JobFailure {
    JobFailure {
        reason: FailureReason::Cancelled,
        message: "Job cancelled while running".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversionJob, OutputFormat};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Succeed,
        Unavailable,
        Reject,
        /// Never returns, even when cancelled.
        Stall,
        /// Waits for cancellation.
        Block,
        /// Ignores cancellation and succeeds after a short delay.
        Slow,
    }

    struct ScriptedConverter {
        steps: std::sync::Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedConverter {
        fn new(steps: &[Step]) -> Arc<Self> {
            Arc::new(Self {
                steps: std::sync::Mutex::new(steps.iter().copied().collect()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Converter for ScriptedConverter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn convert(
            &self,
            request: &ConversionRequest,
            cancel: CancellationToken,
        ) -> Result<ConversionResult, ConverterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Succeed);

            match step {
                Step::Succeed => Ok(ConversionResult {
                    location: format!("{}.out", request.document_url),
                    format: request.format,
                    size_bytes: Some(42),
                }),
                Step::Unavailable => Err(ConverterError::Unavailable("engine busy".into())),
                Step::Reject => Err(ConverterError::Rejected("bad document".into())),
                Step::Stall => std::future::pending().await,
                Step::Block => {
                    cancel.cancelled().await;
                    Err(ConverterError::Cancelled)
                }
                Step::Slow => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(ConversionResult {
                        location: format!("{}.out", request.document_url),
                        format: request.format,
                        size_bytes: None,
                    })
                }
            }
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            worker_count: 1,
            queue_size: 8,
            conversion_timeout_ms: 200,
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
        }
    }

    fn enqueue(tracker: &StatusTracker, tx: &mpsc::Sender<JobId>) -> JobId {
        let job = ConversionJob::new(
            "http://x/doc.pdf".to_string(),
            OutputFormat::Markdown,
            None,
        );
        let id = job.id;
        tracker.insert(job).unwrap();
        tx.try_send(id).unwrap();
        id
    }

    async fn wait_for(tracker: &StatusTracker, id: &JobId, state: JobState) -> ConversionJob {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let job = tracker.get(id).unwrap();
            if job.state == state {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "job stuck in {} waiting for {}",
                job.state,
                state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn start_pool(
        config: WorkerConfig,
        converter: Arc<ScriptedConverter>,
    ) -> (WorkerPool, mpsc::Sender<JobId>, StatusTracker) {
        let tracker = StatusTracker::new();
        let (mut pool, tx) = WorkerPool::new(config, tracker.clone(), converter);
        pool.start();
        (pool, tx, tracker)
    }

    #[tokio::test]
    async fn test_successful_conversion() {
        let converter = ScriptedConverter::new(&[Step::Succeed]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let id = enqueue(&tracker, &tx);
        let job = wait_for(&tracker, &id, JobState::Succeeded).await;

        assert_eq!(job.attempts, 1);
        assert_eq!(job.result.unwrap().location, "http://x/doc.pdf.out");
        assert!(job.error.is_none());
        assert!(job.completed_at.is_some());
        assert_eq!(converter.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let converter =
            ScriptedConverter::new(&[Step::Unavailable, Step::Unavailable, Step::Succeed]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let id = enqueue(&tracker, &tx);
        let job = wait_for(&tracker, &id, JobState::Succeeded).await;

        assert_eq!(job.attempts, 3);
        assert_eq!(converter.calls(), 3);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let converter = ScriptedConverter::new(&[
            Step::Unavailable,
            Step::Unavailable,
            Step::Unavailable,
            Step::Succeed,
        ]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let id = enqueue(&tracker, &tx);
        let job = wait_for(&tracker, &id, JobState::Failed).await;

        assert_eq!(job.attempts, 3);
        assert_eq!(converter.calls(), 3);
        assert_eq!(job.error.unwrap().reason, FailureReason::ConversionFailure);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let converter = ScriptedConverter::new(&[Step::Reject]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let id = enqueue(&tracker, &tx);
        let job = wait_for(&tracker, &id, JobState::Failed).await;

        assert_eq!(job.attempts, 1);
        let error = job.error.unwrap();
        assert_eq!(error.reason, FailureReason::ConversionFailure);
        assert!(error.message.contains("bad document"));
    }

    #[tokio::test]
    async fn test_unresponsive_converter_times_out() {
        let converter = ScriptedConverter::new(&[Step::Stall]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let id = enqueue(&tracker, &tx);
        let job = wait_for(&tracker, &id, JobState::Failed).await;

        assert_eq!(job.attempts, 1);
        assert_eq!(job.error.unwrap().reason, FailureReason::Timeout);
        assert_eq!(converter.calls(), 1);
    }

    #[tokio::test]
    async fn test_worker_continues_after_timeout() {
        let converter = ScriptedConverter::new(&[Step::Stall, Step::Succeed]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let first = enqueue(&tracker, &tx);
        let second = enqueue(&tracker, &tx);

        wait_for(&tracker, &first, JobState::Failed).await;
        wait_for(&tracker, &second, JobState::Succeeded).await;
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let config = WorkerConfig {
            conversion_timeout_ms: 10_000,
            ..test_config()
        };
        let converter = ScriptedConverter::new(&[Step::Block]);
        let tracker = StatusTracker::new();
        let (mut pool, tx) = WorkerPool::new(config, tracker.clone(), converter);
        let in_flight = pool.in_flight();
        pool.start();

        let id = enqueue(&tracker, &tx);
        wait_for(&tracker, &id, JobState::Running).await;

        in_flight.get(&id).expect("running job has a handle").cancel();

        let job = wait_for(&tracker, &id, JobState::Failed).await;
        assert_eq!(job.error.unwrap().reason, FailureReason::Cancelled);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(in_flight.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_advisory_for_converters_that_ignore_it() {
        let config = WorkerConfig {
            conversion_timeout_ms: 10_000,
            ..test_config()
        };
        let converter = ScriptedConverter::new(&[Step::Slow]);
        let tracker = StatusTracker::new();
        let (mut pool, tx) = WorkerPool::new(config, tracker.clone(), converter.clone());
        let in_flight = pool.in_flight();
        pool.start();

        let id = enqueue(&tracker, &tx);
        wait_for(&tracker, &id, JobState::Running).await;
        in_flight.get(&id).expect("running job has a handle").cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.get(&id).unwrap().state, JobState::Running);

        let job = wait_for(&tracker, &id, JobState::Succeeded).await;
        assert_eq!(job.attempts, 1);
        assert!(job.error.is_none());
        assert_eq!(converter.calls(), 1);
    }

    #[tokio::test]
    async fn test_silent_http_engine_times_out_on_first_attempt() {
        use crate::workers::HttpConverter;
        use tokio::net::TcpListener;

        // Accepts connections and holds them open without ever answering.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let tracker = StatusTracker::new();
        let converter = Arc::new(HttpConverter::new(format!("http://{}/convert", addr)));
        let (mut pool, tx) = WorkerPool::new(test_config(), tracker.clone(), converter);
        pool.start();

        let id = enqueue(&tracker, &tx);
        let job = wait_for(&tracker, &id, JobState::Failed).await;

        assert_eq!(job.attempts, 1);
        assert_eq!(job.error.unwrap().reason, FailureReason::Timeout);
    }

    #[tokio::test]
    async fn test_cancelled_pending_job_is_skipped() {
        let converter = ScriptedConverter::new(&[]);
        let (_pool, tx, tracker) = start_pool(test_config(), converter.clone());

        let job = ConversionJob::new("http://x/a.pdf".to_string(), OutputFormat::Text, None);
        let cancelled = job.id;
        tracker.insert(job).unwrap();
        tracker.update(&cancelled, Transition::Cancel).unwrap();
        tx.try_send(cancelled).unwrap();

        let next = enqueue(&tracker, &tx);
        wait_for(&tracker, &next, JobState::Succeeded).await;

        assert_eq!(converter.calls(), 1);
        assert_eq!(tracker.get(&cancelled).unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_disabled_pool_leaves_jobs_pending() {
        let config = WorkerConfig {
            enabled: false,
            queue_size: 2,
            ..test_config()
        };
        let converter = ScriptedConverter::new(&[]);
        let (_pool, tx, tracker) = start_pool(config, converter.clone());

        let id = enqueue(&tracker, &tx);
        enqueue(&tracker, &tx);
        assert!(tx.try_send(JobId::new()).is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.get(&id).unwrap().state, JobState::Pending);
        assert_eq!(converter.calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_and_closes_queue() {
        let config = WorkerConfig {
            conversion_timeout_ms: 10_000,
            worker_count: 2,
            ..test_config()
        };
        let converter = ScriptedConverter::new(&[Step::Block]);
        let (pool, tx, tracker) = start_pool(config, converter);

        let id = enqueue(&tracker, &tx);
        wait_for(&tracker, &id, JobState::Running).await;

        pool.shutdown().await;

        let job = tracker.get(&id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.unwrap().reason, FailureReason::Cancelled);
        assert!(tx.is_closed());
    }
}
