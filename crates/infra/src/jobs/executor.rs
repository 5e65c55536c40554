//! Runs one claimed job through its handler and records the outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use agencyhub_core::Clock;
use agencyhub_scheduling::{Job, JobId, JobTransition, RetryPolicy};

use super::handlers::{HandlerError, HandlerRegistry, HandlerSuccess};
use super::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Per-job line of the invocation summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub id: JobId,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    fn success(id: JobId) -> Self {
        Self {
            id,
            status: OutcomeStatus::Success,
            error: None,
        }
    }

    fn failed(id: JobId, error: impl Into<String>) -> Self {
        Self {
            id,
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Dispatches claimed jobs and writes back exactly one transition each.
///
/// Nothing a single job does (error, panic, failed write-back) escapes
/// `execute`; the caller always gets a `JobOutcome`.
pub struct JobExecutor {
    registry: HandlerRegistry,
    store: Arc<dyn JobStore>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl JobExecutor {
    pub fn new(
        registry: HandlerRegistry,
        store: Arc<dyn JobStore>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            policy,
            clock,
        }
    }

    pub async fn execute(&self, job: &Job) -> JobOutcome {
        let result = self.run_handler(job).await;

        let now = self.clock.now();
        let transition = match &result {
            Ok(_) => JobTransition::completed(now),
            Err(e) => JobTransition::after_failure(job, e.to_string(), &self.policy, now),
        };

        if let Err(store_err) = self.store.apply(job.id, &transition).await {
            let handler_result = match &result {
                Ok(_) => "handler succeeded".to_string(),
                Err(e) => e.to_string(),
            };
            error!(
                job_id = %job.id,
                job_type = %job.job_type,
                tenant_id = %job.tenant_id,
                attempts = job.attempts,
                error = %store_err,
                "failed to record job outcome; job left running"
            );
            return JobOutcome::failed(
                job.id,
                format!("{handler_result}; outcome not recorded: {store_err}"),
            );
        }

        match (result, &transition) {
            (Ok(success), _) => {
                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    tenant_id = %job.tenant_id,
                    attempts = job.attempts,
                    remote_id = success.remote_id.as_deref(),
                    "job completed"
                );
                JobOutcome::success(job.id)
            }
            (Err(e), JobTransition::Retry { scheduled_for, .. }) => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    tenant_id = %job.tenant_id,
                    attempts = job.attempts,
                    retry_at = %scheduled_for,
                    error = %e,
                    "job failed; retry scheduled"
                );
                JobOutcome::failed(job.id, e.to_string())
            }
            (Err(e), _) => {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    tenant_id = %job.tenant_id,
                    attempts = job.attempts,
                    error = %e,
                    "job failed permanently"
                );
                JobOutcome::failed(job.id, e.to_string())
            }
        }
    }

    async fn run_handler(&self, job: &Job) -> Result<HandlerSuccess, HandlerError> {
        let Some(handler) = self.registry.get(&job.job_type) else {
            return Err(HandlerError::Unsupported(job.job_type.clone()));
        };

        match AssertUnwindSafe(handler.handle(job)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
