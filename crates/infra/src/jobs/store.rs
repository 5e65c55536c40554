//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use agencyhub_scheduling::{Job, JobId, JobTransition};

/// The shared queue table.
///
/// Every mutation is a single-row update keyed by job id. `claim_due` must be
/// atomic per job: two concurrent callers never receive the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job.
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Claim up to `limit` due jobs, oldest `scheduled_for` first.
    ///
    /// Claimed jobs are returned already `running`, with `started_at = now`
    /// and `attempts` incremented.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Apply the post-handler transition to a running job.
    async fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every stored job, oldest `created_at` first.
    pub fn all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        all
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(&job_id).cloned())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        // Selection and mutation happen under one write lock.
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

        let mut due: Vec<_> = jobs
            .values()
            .filter(|j| j.is_due(now))
            .map(|j| (j.scheduled_for, j.created_at, j.id))
            .collect();
        due.sort_by_key(|(scheduled_for, created_at, _)| (*scheduled_for, *created_at));
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, _, id) in due {
            if let Some(job) = jobs.get_mut(&id) {
                job.claim(now)
                    .map_err(|e| JobStoreError::InvalidTransition(e.to_string()))?;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        // Work on a copy so a rejected transition leaves the row untouched.
        let mut updated = job.clone();
        updated
            .apply(transition)
            .map_err(|e| JobStoreError::InvalidTransition(e.to_string()))?;
        *job = updated;
        Ok(())
    }
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id).await
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).claim_due(now, limit).await
    }

    async fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<(), JobStoreError> {
        (**self).apply(job_id, transition).await
    }
}
