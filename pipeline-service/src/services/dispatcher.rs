use crate::error::PipelineError;
use crate::models::{ConversionJob, JobId, JobState, Transition};
use crate::services::tracker::StatusTracker;
use crate::services::validation::JobDraft;
use crate::workers::InFlight;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Result of a cancel request that changed or signalled something.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The job was still pending and is now `Failed` with reason `cancelled`.
    Cancelled(ConversionJob),
    /// The job was already running; its worker has been asked to stop.
    Signalled(ConversionJob),
}

/// Admits validated drafts into the job table and the worker queue.
#[derive(Clone)]
pub struct JobDispatcher {
    tracker: StatusTracker,
    queue: mpsc::Sender<JobId>,
    in_flight: InFlight,
    capacity: usize,
}

impl JobDispatcher {
    pub fn new(tracker: StatusTracker, queue: mpsc::Sender<JobId>, in_flight: InFlight) -> Self {
        let capacity = queue.max_capacity();
        Self {
            tracker,
            queue,
            in_flight,
            capacity,
        }
    }

    /// Create a pending job for `draft` and hand it to the workers.
    ///
    /// A queue slot is reserved before the job is registered, so a full queue
    /// leaves the job table untouched.
    pub fn submit(&self, draft: JobDraft) -> Result<JobId, PipelineError> {
        let permit = self.queue.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => {
                metrics::counter!("conversion_jobs_rejected", "reason" => "capacity").increment(1);
                tracing::warn!(capacity = self.capacity, "Job queue full, rejecting submission");
                PipelineError::CapacityExceeded {
                    capacity: self.capacity,
                }
            }
            TrySendError::Closed(()) => PipelineError::QueueClosed,
        })?;

        let job = ConversionJob::new(draft.document_url, draft.format, draft.request_id);
        let job_id = job.id;

        tracing::info!(
            job_id = %job_id,
            document_url = %job.document_url,
            format = %job.format,
            "Conversion job accepted"
        );

        self.tracker.insert(job)?;
        permit.send(job_id);

        metrics::counter!("conversion_jobs_submitted").increment(1);
        Ok(job_id)
    }

    pub fn cancel(&self, job_id: &JobId) -> Result<CancelOutcome, PipelineError> {
        match self.tracker.update(job_id, Transition::Cancel) {
            Ok(job) => {
                metrics::counter!("conversion_jobs_failed", "reason" => "cancelled").increment(1);
                tracing::info!(job_id = %job_id, "Pending job cancelled");
                Ok(CancelOutcome::Cancelled(job))
            }
            Err(PipelineError::InvalidTransition {
                from: JobState::Running,
                ..
            }) => self.signal_running(job_id),
            Err(PipelineError::InvalidTransition { from, .. }) => {
                Err(PipelineError::AlreadyTerminal {
                    job_id: *job_id,
                    state: from,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn signal_running(&self, job_id: &JobId) -> Result<CancelOutcome, PipelineError> {
        if let Some(token) = self.in_flight.get(job_id) {
            token.cancel();
        }

        // The worker may have finished the job since the cancel was refused.
        let job = self.tracker.get(job_id)?;
        if job.state.is_terminal() {
            return Err(PipelineError::AlreadyTerminal {
                job_id: *job_id,
                state: job.state,
            });
        }

        tracing::info!(job_id = %job_id, "Cancellation signalled to running job");
        Ok(CancelOutcome::Signalled(job))
    }

    /// False once the worker pool has shut down and dropped the queue.
    pub fn is_accepting(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Jobs waiting in the queue for a worker.
    pub fn queued(&self) -> usize {
        self.capacity - self.queue.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
