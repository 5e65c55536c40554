//! WordPress REST API client (application-password basic auth).

use async_trait::async_trait;
use reqwest::{Url, header};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::error_body;
use super::publishing::{MediaId, PostPayload, PublishError, PublishingClient, RemotePost, TargetCredentials};

const MEDIA_PATH: &str = "/wp-json/wp/v2/media";
const POSTS_PATH: &str = "/wp-json/wp/v2/posts";
const FALLBACK_FILENAME: &str = "featured-image";

/// Largest featured image fetched for upload.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct WordPressClient {
    client: reqwest::Client,
    max_image_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: u64,
    link: Option<String>,
}

impl WordPressClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    fn endpoint(site_url: &str, path: &str) -> String {
        format!("{}{}", site_url.trim_end_matches('/'), path)
    }

    async fn read_error(resp: reqwest::Response) -> PublishError {
        let status = resp.status().as_u16();
        PublishError::Api(status, error_body(resp).await)
    }

    /// Read the image body, refusing anything over `max_image_bytes`
    /// whether or not the server declared a length.
    async fn read_image(&self, image_url: &str, mut image: reqwest::Response) -> Result<Vec<u8>, PublishError> {
        let too_large = || {
            PublishError::ImageUnavailable(format!(
                "{image_url} (larger than {} bytes)",
                self.max_image_bytes
            ))
        };
        if let Some(declared) = image.content_length() {
            if declared > self.max_image_bytes as u64 {
                return Err(too_large());
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = image
            .chunk()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?
        {
            if bytes.len() + chunk.len() > self.max_image_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Last path segment of the image URL, used as the upload filename.
fn filename_from_url(image_url: &str) -> String {
    Url::parse(image_url)
        .ok()
        .and_then(|url| url.path_segments().and_then(|s| s.last()).map(str::to_owned))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

#[async_trait]
impl PublishingClient for WordPressClient {
    #[instrument(skip(self, credentials), fields(site = %credentials.site_url), err)]
    async fn upload_media(
        &self,
        credentials: &TargetCredentials,
        image_url: &str,
    ) -> Result<MediaId, PublishError> {
        let image = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;
        if !image.status().is_success() {
            return Err(PublishError::ImageUnavailable(format!(
                "{image_url} (status {})",
                image.status().as_u16()
            )));
        }

        let content_type = image
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = self.read_image(image_url, image).await?;

        let resp = self
            .client
            .post(Self::endpoint(&credentials.site_url, MEDIA_PATH))
            .basic_auth(&credentials.username, Some(credentials.password.expose()))
            .header(header::CONTENT_TYPE, content_type)
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename_from_url(image_url)),
            )
            .body(bytes)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }

        let media: MediaResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(MediaId(media.id))
    }

    #[instrument(skip(self, credentials, payload), fields(site = %credentials.site_url), err)]
    async fn create_post(
        &self,
        credentials: &TargetCredentials,
        payload: &PostPayload,
    ) -> Result<RemotePost, PublishError> {
        let mut body = json!({
            "title": payload.title,
            "content": payload.content,
            "status": "publish",
        });
        if let Some(excerpt) = &payload.excerpt {
            body["excerpt"] = json!(excerpt);
        }
        if let Some(media) = payload.featured_media {
            body["featured_media"] = json!(media.0);
        }

        let resp = self
            .client
            .post(Self::endpoint(&credentials.site_url, POSTS_PATH))
            .basic_auth(&credentials.username, Some(credentials.password.expose()))
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }

        let post: PostResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(RemotePost {
            id: post.id.to_string(),
            link: post.link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::crypto::SecretString;
    use axum::{
        Json, Router,
        body::Bytes,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use serde_json::Value;

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn credentials(site_url: &str) -> TargetCredentials {
        TargetCredentials {
            site_url: format!("{site_url}/"),
            username: "editor".into(),
            password: SecretString::new("app-password"),
        }
    }

    fn header(headers: &HeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn filename_is_the_last_path_segment() {
        assert_eq!(filename_from_url("https://cdn.example.com/img/hero.png?w=800"), "hero.png");
        assert_eq!(filename_from_url("https://cdn.example.com/"), "featured-image");
        assert_eq!(filename_from_url("not a url"), "featured-image");
    }

    #[tokio::test]
    async fn create_post_publishes_with_basic_auth() {
        let router = Router::new().route(
            "/wp-json/wp/v2/posts",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                // base64("editor:app-password")
                if header(&headers, "authorization") != "Basic ZWRpdG9yOmFwcC1wYXNzd29yZA==" {
                    return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "code": "rest_forbidden" })));
                }
                assert_eq!(body["status"], "publish");
                assert_eq!(body["featured_media"], 7);
                (
                    StatusCode::CREATED,
                    Json(serde_json::json!({ "id": 42, "link": "https://blog.example.com/?p=42" })),
                )
            }),
        );
        let base = spawn_stub(router).await;

        let client = WordPressClient::new(reqwest::Client::new());
        let post = client
            .create_post(
                &credentials(&base),
                &PostPayload {
                    title: "Hello".into(),
                    content: "<p>World</p>".into(),
                    excerpt: None,
                    featured_media: Some(MediaId(7)),
                },
            )
            .await
            .unwrap();

        assert_eq!(post.id, "42");
        assert_eq!(post.link.as_deref(), Some("https://blog.example.com/?p=42"));
    }

    #[tokio::test]
    async fn rejected_post_surfaces_status_and_body() {
        let router = Router::new().route(
            "/wp-json/wp/v2/posts",
            post(|| async { (StatusCode::FORBIDDEN, "rest_cannot_create") }),
        );
        let base = spawn_stub(router).await;

        let client = WordPressClient::new(reqwest::Client::new());
        let err = client
            .create_post(
                &credentials(&base),
                &PostPayload {
                    title: "Hello".into(),
                    content: "<p>World</p>".into(),
                    excerpt: Some("Short".into()),
                    featured_media: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Api(403, ref body) if body == "rest_cannot_create"));
    }

    #[tokio::test]
    async fn upload_media_forwards_the_image_bytes() {
        let router = Router::new()
            .route(
                "/images/hero.png",
                get(|| async { ([("content-type", "image/png")], vec![0x89_u8, b'P', b'N', b'G']) }),
            )
            .route(
                "/wp-json/wp/v2/media",
                post(|headers: HeaderMap, body: Bytes| async move {
                    assert_eq!(header(&headers, "content-type"), "image/png");
                    assert_eq!(
                        header(&headers, "content-disposition"),
                        "attachment; filename=\"hero.png\""
                    );
                    assert_eq!(body.as_ref(), &[0x89_u8, b'P', b'N', b'G']);
                    (StatusCode::CREATED, Json(serde_json::json!({ "id": 7 })))
                }),
            );
        let base = spawn_stub(router).await;

        let client = WordPressClient::new(reqwest::Client::new());
        let media = client
            .upload_media(&credentials(&base), &format!("{base}/images/hero.png"))
            .await
            .unwrap();
        assert_eq!(media, MediaId(7));
    }

    #[tokio::test]
    async fn oversized_image_is_refused_before_upload() {
        let router = Router::new()
            .route(
                "/images/huge.png",
                get(|| async { ([("content-type", "image/png")], vec![0_u8; 64]) }),
            )
            .route(
                "/wp-json/wp/v2/media",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "should not be called") }),
            );
        let base = spawn_stub(router).await;

        let client = WordPressClient::new(reqwest::Client::new()).with_max_image_bytes(16);
        let err = client
            .upload_media(&credentials(&base), &format!("{base}/images/huge.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ImageUnavailable(ref msg) if msg.contains("larger than 16 bytes")));
    }

    #[tokio::test]
    async fn long_remote_errors_are_truncated() {
        let router = Router::new().route(
            "/wp-json/wp/v2/posts",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>".repeat(2_000)) }),
        );
        let base = spawn_stub(router).await;

        let client = WordPressClient::new(reqwest::Client::new());
        let err = client
            .create_post(
                &credentials(&base),
                &PostPayload {
                    title: "Hello".into(),
                    content: "<p>World</p>".into(),
                    excerpt: None,
                    featured_media: None,
                },
            )
            .await
            .unwrap_err();
        match err {
            PublishError::Api(500, body) => {
                assert!(body.ends_with("..."));
                assert!(body.len() <= crate::external::MAX_ERROR_BODY_CHARS + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_image_is_reported_without_uploading() {
        let router = Router::new().route(
            "/wp-json/wp/v2/media",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "should not be called") }),
        );
        let base = spawn_stub(router).await;

        let client = WordPressClient::new(reqwest::Client::new());
        let err = client
            .upload_media(&credentials(&base), &format!("{base}/images/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ImageUnavailable(_)));
    }
}
