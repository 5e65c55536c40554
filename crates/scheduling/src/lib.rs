//! Scheduled job domain (pure).
//!
//! The job record, its state machine, and the retry/backoff policy. No IO:
//! stores and handlers live in `agencyhub-infra`.

pub mod job;
pub mod retry;

pub use job::{Job, JobId, JobStatus, JobTransition, JobType, DEFAULT_MAX_ATTEMPTS};
pub use retry::{RetryDecision, RetryPolicy};
