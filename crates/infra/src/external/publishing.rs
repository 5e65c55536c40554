//! Publishing destination abstraction.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::crypto::SecretString;

/// Decrypted credentials for one publishing target.
#[derive(Debug, Clone)]
pub struct TargetCredentials {
    pub site_url: String,
    pub username: String,
    pub password: SecretString,
}

/// Remote identifier of an uploaded media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub u64);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A post to create on the remote site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPayload {
    pub title: String,
    /// HTML body
    pub content: String,
    pub excerpt: Option<String>,
    pub featured_media: Option<MediaId>,
}

/// What the remote site returned for a created post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePost {
    pub id: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote returned {0}: {1}")]
    Api(u16, String),
    #[error("could not fetch image {0}")]
    ImageUnavailable(String),
    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait PublishingClient: Send + Sync {
    /// Upload the image at `image_url` to the target's media library.
    async fn upload_media(
        &self,
        credentials: &TargetCredentials,
        image_url: &str,
    ) -> Result<MediaId, PublishError>;

    async fn create_post(
        &self,
        credentials: &TargetCredentials,
        payload: &PostPayload,
    ) -> Result<RemotePost, PublishError>;
}
