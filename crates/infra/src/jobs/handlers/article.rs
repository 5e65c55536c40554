//! Publish an article to the tenant's WordPress site.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use agencyhub_core::{Clock, ContentId};
use agencyhub_scheduling::Job;

use super::{HandlerError, HandlerSuccess, JobHandler};
use crate::content::{ContentItem, ContentStore, PublishedPost};
use crate::external::{CredentialDecryptor, MediaId, PostPayload, PublishingClient, TargetCredentials};

/// Write-back attempts for the published marker once the remote post exists.
const MARK_PUBLISHED_ATTEMPTS: usize = 3;

pub struct PublishArticleHandler {
    content: Arc<dyn ContentStore>,
    decryptor: Arc<dyn CredentialDecryptor>,
    publisher: Arc<dyn PublishingClient>,
    clock: Arc<dyn Clock>,
}

impl PublishArticleHandler {
    pub fn new(
        content: Arc<dyn ContentStore>,
        decryptor: Arc<dyn CredentialDecryptor>,
        publisher: Arc<dyn PublishingClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            content,
            decryptor,
            publisher,
            clock,
        }
    }

    /// Best effort: a failed upload publishes the post without an image.
    async fn upload_featured_image(
        &self,
        credentials: &TargetCredentials,
        content: &ContentItem,
    ) -> Option<MediaId> {
        let image_url = content.featured_image_url.as_deref()?;
        match self.publisher.upload_media(credentials, image_url).await {
            Ok(media_id) => Some(media_id),
            Err(e) => {
                warn!(content_id = %content.id, image_url, error = %e, "featured image upload failed; publishing without it");
                None
            }
        }
    }

    /// The remote post already exists, so a failure here must not fail the
    /// job: a retry would post the article again.
    async fn record_published(&self, content_id: ContentId, post: &PublishedPost) {
        for attempt in 1..=MARK_PUBLISHED_ATTEMPTS {
            match self.content.mark_published(content_id, post).await {
                Ok(()) => return,
                Err(e) if attempt < MARK_PUBLISHED_ATTEMPTS => {
                    warn!(content_id = %content_id, attempt, error = %e, "recording published post failed; retrying");
                }
                Err(e) => {
                    error!(
                        content_id = %content_id,
                        remote_post_id = %post.remote_post_id,
                        error = %e,
                        "article is live but could not be marked published"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for PublishArticleHandler {
    #[instrument(skip(self, job), fields(job_id = %job.id, tenant_id = %job.tenant_id), err)]
    async fn handle(&self, job: &Job) -> Result<HandlerSuccess, HandlerError> {
        let content_id = job.content_id.ok_or(HandlerError::MissingContent)?;
        let content = self
            .content
            .get_content(content_id)
            .await?
            .ok_or(HandlerError::ContentNotFound(content_id))?;

        if content.tenant_id != job.tenant_id {
            return Err(HandlerError::TenantMismatch(format!(
                "content {content_id} does not belong to tenant {}",
                job.tenant_id
            )));
        }

        // A retry after a lost write-back must not create a second post.
        if content.is_published() {
            info!(content_id = %content_id, "content already published; skipping");
            return Ok(HandlerSuccess {
                remote_id: content.remote_post_id.clone(),
            });
        }

        let target_id = content
            .publishing_target_id
            .ok_or(HandlerError::TargetNotConfigured(content_id))?;
        let target = self
            .content
            .get_target(target_id)
            .await?
            .ok_or(HandlerError::TargetNotFound(target_id))?;

        if target.tenant_id != content.tenant_id {
            return Err(HandlerError::TenantMismatch(format!(
                "publishing target {target_id} does not belong to tenant {}",
                content.tenant_id
            )));
        }
        if !target.connected {
            return Err(HandlerError::TargetNotConnected(target_id));
        }

        let password = self.decryptor.decrypt(&target.credentials).await?;
        let credentials = TargetCredentials {
            site_url: target.site_url.clone(),
            username: target.username.clone(),
            password,
        };

        let featured_media = self.upload_featured_image(&credentials, &content).await;
        let post = self
            .publisher
            .create_post(
                &credentials,
                &PostPayload {
                    title: content.title.clone(),
                    content: content.body.clone(),
                    excerpt: content.excerpt.clone(),
                    featured_media,
                },
            )
            .await?;

        self.record_published(
            content_id,
            &PublishedPost {
                remote_post_id: post.id.clone(),
                remote_url: post.link.clone(),
                published_at: self.clock.now(),
            },
        )
        .await;

        info!(content_id = %content_id, remote_post_id = %post.id, "article published");
        Ok(HandlerSuccess {
            remote_id: Some(post.id),
        })
    }
}
