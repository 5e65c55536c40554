//! Domain records acted on by publish handlers: content items and the
//! publishing targets they are published to.

pub mod postgres;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{ContentId, DomainError, DomainResult, TargetId, TenantId};

use crate::external::crypto::EncryptedSecret;

pub use postgres::PostgresContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Scheduled => "scheduled",
            ContentStatus::Published => "published",
            ContentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "scheduled" => Ok(ContentStatus::Scheduled),
            "published" => Ok(ContentStatus::Published),
            "failed" => Ok(ContentStatus::Failed),
            other => Err(DomainError::validation(format!("unknown content status: {other}"))),
        }
    }
}

/// An article (or other piece of content) owned by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub tenant_id: TenantId,
    pub title: String,
    /// HTML body
    pub body: String,
    pub excerpt: Option<String>,
    pub featured_image_url: Option<String>,
    pub publishing_target_id: Option<TargetId>,
    pub status: ContentStatus,
    pub remote_post_id: Option<String>,
    pub remote_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    pub fn draft(tenant_id: TenantId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: ContentId::new(),
            tenant_id,
            title: title.into(),
            body: body.into(),
            excerpt: None,
            featured_image_url: None,
            publishing_target_id: None,
            status: ContentStatus::Draft,
            remote_post_id: None,
            remote_url: None,
            published_at: None,
        }
    }

    pub fn with_target(mut self, target_id: TargetId) -> Self {
        self.publishing_target_id = Some(target_id);
        self
    }

    pub fn with_featured_image(mut self, url: impl Into<String>) -> Self {
        self.featured_image_url = Some(url.into());
        self
    }

    /// Published with a known remote post; republishing would duplicate it.
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published && self.remote_post_id.is_some()
    }
}

/// A tenant's connected publishing destination (e.g. a WordPress site).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishingTarget {
    pub id: TargetId,
    pub tenant_id: TenantId,
    pub site_url: String,
    pub username: String,
    /// Application password, encrypted at rest
    pub credentials: EncryptedSecret,
    pub connected: bool,
}

/// What the remote system reported for a created post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub remote_post_id: String,
    pub remote_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentStoreError {
    #[error("content not found: {0}")]
    NotFound(ContentId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Read/update access to content items and publishing targets.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content(&self, id: ContentId) -> Result<Option<ContentItem>, ContentStoreError>;

    async fn get_target(&self, id: TargetId) -> Result<Option<PublishingTarget>, ContentStoreError>;

    /// Set the content status to `published` and record the remote post.
    async fn mark_published(&self, id: ContentId, post: &PublishedPost) -> Result<(), ContentStoreError>;
}

/// In-memory content store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    content: RwLock<HashMap<ContentId, ContentItem>>,
    targets: RwLock<HashMap<TargetId, PublishingTarget>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert_content(&self, item: ContentItem) {
        self.content
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item.id, item);
    }

    pub fn insert_target(&self, target: PublishingTarget) {
        self.targets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(target.id, target);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content(&self, id: ContentId) -> Result<Option<ContentItem>, ContentStoreError> {
        let content = self.content.read().unwrap_or_else(|e| e.into_inner());
        Ok(content.get(&id).cloned())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<PublishingTarget>, ContentStoreError> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        Ok(targets.get(&id).cloned())
    }

    async fn mark_published(&self, id: ContentId, post: &PublishedPost) -> Result<(), ContentStoreError> {
        let mut content = self.content.write().unwrap_or_else(|e| e.into_inner());
        let item = content.get_mut(&id).ok_or(ContentStoreError::NotFound(id))?;
        item.status = ContentStatus::Published;
        item.remote_post_id = Some(post.remote_post_id.clone());
        item.remote_url = post.remote_url.clone();
        item.published_at = Some(post.published_at);
        Ok(())
    }
}
