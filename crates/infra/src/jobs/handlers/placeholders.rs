use async_trait::async_trait;

use agencyhub_scheduling::Job;

use super::{HandlerError, HandlerSuccess, JobHandler};

/// Google Business Profile publishing. Not implemented; every job fails and
/// follows the normal retry path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishGmbHandler;

#[async_trait]
impl JobHandler for PublishGmbHandler {
    async fn handle(&self, _job: &Job) -> Result<HandlerSuccess, HandlerError> {
        Err(HandlerError::NotImplemented(
            "publishing to Google Business Profile is not available yet".into(),
        ))
    }
}

/// Outbound e-mail. Not implemented; see [`PublishGmbHandler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SendEmailHandler;

#[async_trait]
impl JobHandler for SendEmailHandler {
    async fn handle(&self, _job: &Job) -> Result<HandlerSuccess, HandlerError> {
        Err(HandlerError::NotImplemented(
            "sending e-mail from scheduled jobs is not available yet".into(),
        ))
    }
}
