//! One processor invocation: preflight, claim a batch, run it, summarize.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use agencyhub_core::Clock;

use super::claimer::JobClaimer;
use super::executor::{JobExecutor, JobOutcome};
use super::store::JobStoreError;
use crate::external::{CredentialDecryptor, DecryptError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<JobOutcome>,
}

impl ProcessSummary {
    pub fn from_outcomes(results: Vec<JobOutcome>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            processed: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

/// Invocation-level failure. Per-job failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("job store unavailable: {0}")]
    Store(#[from] JobStoreError),
    #[error("credential decryption unavailable: {0}")]
    DecryptionUnavailable(#[from] DecryptError),
}

pub struct JobProcessor {
    claimer: JobClaimer,
    executor: JobExecutor,
    decryptor: Arc<dyn CredentialDecryptor>,
    clock: Arc<dyn Clock>,
}

impl JobProcessor {
    pub fn new(
        claimer: JobClaimer,
        executor: JobExecutor,
        decryptor: Arc<dyn CredentialDecryptor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            claimer,
            executor,
            decryptor,
            clock,
        }
    }

    /// Jobs in the batch run one at a time, in claim order.
    #[instrument(skip(self), err)]
    pub async fn run(&self) -> Result<ProcessSummary, ProcessError> {
        self.decryptor.ensure_ready()?;

        let jobs = self.claimer.claim(self.clock.now()).await?;
        let mut results = Vec::with_capacity(jobs.len());
        for job in &jobs {
            results.push(self.executor.execute(job).await);
        }

        let summary = ProcessSummary::from_outcomes(results);
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "scheduled jobs processed"
        );
        Ok(summary)
    }
}
