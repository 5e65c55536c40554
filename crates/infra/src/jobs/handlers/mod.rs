//! Per-job-type handlers and the registry that dispatches to them.

mod article;
mod placeholders;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use agencyhub_core::{Clock, ContentId, TargetId};
use agencyhub_scheduling::{Job, JobType};

use crate::content::{ContentStore, ContentStoreError};
use crate::external::{CredentialDecryptor, DecryptError, PublishError, PublishingClient};

pub use article::PublishArticleHandler;
pub use placeholders::{PublishGmbHandler, SendEmailHandler};

/// Result of a successful handler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSuccess {
    /// Identifier of whatever the handler created remotely, if anything.
    pub remote_id: Option<String>,
}

/// Why a single job failed. Every variant is recorded on the job and routed
/// through the retry policy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("job has no content_id")]
    MissingContent,

    #[error("content {0} not found")]
    ContentNotFound(ContentId),

    #[error("content {0} has no publishing target configured")]
    TargetNotConfigured(ContentId),

    #[error("publishing target {0} not found")]
    TargetNotFound(TargetId),

    #[error("tenant mismatch: {0}")]
    TenantMismatch(String),

    #[error("publishing target {0} is not connected")]
    TargetNotConnected(TargetId),

    #[error("credential decryption failed: {0}")]
    Decryption(#[from] DecryptError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("unsupported job type: {0}")]
    Unsupported(JobType),

    #[error("content store error: {0}")]
    Store(#[from] ContentStoreError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<HandlerSuccess, HandlerError>;
}

/// Maps job types to handlers. Types without an entry are unsupported.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(JobType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("types", &types).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production set: article publishing plus the GMB and e-mail
    /// placeholders. `generate_content` has no handler.
    pub fn standard(
        content: Arc<dyn ContentStore>,
        decryptor: Arc<dyn CredentialDecryptor>,
        publisher: Arc<dyn PublishingClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new()
            .with(
                JobType::PublishArticle,
                Arc::new(PublishArticleHandler::new(content, decryptor, publisher, clock)),
            )
            .with(JobType::PublishGmb, Arc::new(PublishGmbHandler))
            .with(JobType::SendEmail, Arc::new(SendEmailHandler))
    }

    pub fn with(mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Self {
        self.register(job_type, handler);
        self
    }

    /// Register (or replace) the handler for a job type.
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn supports(&self, job_type: &JobType) -> bool {
        self.handlers.contains_key(job_type)
    }
}
