//! Scheduled job processing.
//!
//! ## Components
//!
//! - `JobStore`: the queue table (Postgres or in-memory)
//! - `JobClaimer`: atomically moves due jobs to `running`
//! - `HandlerRegistry` / `JobHandler`: per-type side effects
//! - `JobExecutor`: runs one job and writes back its transition
//! - `JobProcessor`: one invocation over a claimed batch

pub mod claimer;
pub mod executor;
pub mod handlers;
pub mod postgres;
pub mod processor;
pub mod store;

pub use claimer::{DEFAULT_BATCH_LIMIT, JobClaimer};
pub use executor::{JobExecutor, JobOutcome, OutcomeStatus};
pub use handlers::{
    HandlerError, HandlerRegistry, HandlerSuccess, JobHandler, PublishArticleHandler, PublishGmbHandler,
    SendEmailHandler,
};
pub use postgres::PostgresJobStore;
pub use processor::{JobProcessor, ProcessError, ProcessSummary};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
