//! In-memory job table.
//!
//! The tracker is the only place a [`ConversionJob`] is mutated. Every change goes
//! through [`StatusTracker::update`], which holds the entry's shard lock while the
//! transition is checked and applied, so updates to one job are serialized while
//! updates to different jobs proceed independently.

use crate::error::PipelineError;
use crate::models::{ConversionJob, JobId, JobState, Transition};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub limit: Option<usize>,
}

#[derive(Clone, Default)]
pub struct StatusTracker {
    jobs: Arc<DashMap<JobId, ConversionJob>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created job. Identifiers are never reused; inserting an
    /// id that is already present is an internal error.
    pub fn insert(&self, job: ConversionJob) -> Result<(), PipelineError> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job.id) {
            Entry::Occupied(existing) => Err(PipelineError::InvalidTransition {
                job_id: job.id,
                from: existing.get().state,
                to: JobState::Pending,
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(job_id = %job.id, "Job registered");
                slot.insert(job);
                Ok(())
            }
        }
    }

    pub fn get(&self, job_id: &JobId) -> Result<ConversionJob, PipelineError> {
        self.jobs
            .get(job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))
    }

    /// Atomically apply `transition` and return the updated job.
    pub fn update(
        &self,
        job_id: &JobId,
        transition: Transition,
    ) -> Result<ConversionJob, PipelineError> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))?;

        let to = transition.target();
        entry
            .apply(transition)
            .map_err(|from| PipelineError::InvalidTransition {
                job_id: *job_id,
                from,
                to,
            })?;

        tracing::debug!(job_id = %job_id, state = %to, "Job state updated");
        Ok(entry.value().clone())
    }

    /// Count one more collaborator invocation for a running job.
    pub fn record_attempt(&self, job_id: &JobId) -> Result<u32, PipelineError> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))?;

        if entry.state != JobState::Running {
            return Err(PipelineError::InvalidTransition {
                job_id: *job_id,
                from: entry.state,
                to: JobState::Running,
            });
        }

        entry.attempts += 1;
        Ok(entry.attempts)
    }

    /// Snapshot of jobs matching `filter`, newest first.
    pub fn list(&self, filter: &JobFilter) -> Vec<ConversionJob> {
        let mut jobs: Vec<ConversionJob> = self
            .jobs
            .iter()
            .filter(|entry| filter.state.is_none_or(|state| entry.state == state))
            .map(|entry| entry.value().clone())
            .collect();

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }

        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
