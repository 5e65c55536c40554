//! Postgres-backed content store over `content_items` and `publishing_targets`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;

use agencyhub_core::{ContentId, TargetId, TenantId};

use super::{ContentItem, ContentStatus, ContentStore, ContentStoreError, PublishedPost, PublishingTarget};
use crate::external::crypto::EncryptedSecret;

#[derive(Debug, Clone)]
pub struct PostgresContentStore {
    pool: Arc<PgPool>,
}

impl PostgresContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    #[instrument(skip(self), fields(content_id = %id), err)]
    async fn get_content(&self, id: ContentId) -> Result<Option<ContentItem>, ContentStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, title, body, excerpt, featured_image_url, publishing_target_id,
                   status, remote_post_id, remote_url, published_at
            FROM content_items
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_content", e))?;

        row.map(|r| content_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(target_id = %id), err)]
    async fn get_target(&self, id: TargetId) -> Result<Option<PublishingTarget>, ContentStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, site_url, username,
                   credential_encrypted, credential_iv, credential_tag, connected
            FROM publishing_targets
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_target", e))?;

        row.map(|r| target_from_row(&r)).transpose()
    }

    #[instrument(skip(self, post), fields(content_id = %id, remote_post_id = %post.remote_post_id), err)]
    async fn mark_published(&self, id: ContentId, post: &PublishedPost) -> Result<(), ContentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET status = 'published',
                remote_post_id = $2,
                remote_url = $3,
                published_at = $4,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&post.remote_post_id)
        .bind(&post.remote_url)
        .bind(post.published_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_published", e))?;

        if result.rows_affected() == 0 {
            return Err(ContentStoreError::NotFound(id));
        }
        Ok(())
    }
}

fn decode_error(e: sqlx::Error) -> ContentStoreError {
    ContentStoreError::Storage(format!("failed to decode row: {e}"))
}

fn content_from_row(row: &PgRow) -> Result<ContentItem, ContentStoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let target_id: Option<uuid::Uuid> = row.try_get("publishing_target_id").map_err(decode_error)?;

    Ok(ContentItem {
        id: ContentId::from_uuid(row.try_get("id").map_err(decode_error)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode_error)?),
        title: row.try_get("title").map_err(decode_error)?,
        body: row.try_get("body").map_err(decode_error)?,
        excerpt: row.try_get("excerpt").map_err(decode_error)?,
        featured_image_url: row.try_get("featured_image_url").map_err(decode_error)?,
        publishing_target_id: target_id.map(TargetId::from_uuid),
        status: ContentStatus::parse(&status).map_err(|e| ContentStoreError::Storage(e.to_string()))?,
        remote_post_id: row.try_get("remote_post_id").map_err(decode_error)?,
        remote_url: row.try_get("remote_url").map_err(decode_error)?,
        published_at: row.try_get("published_at").map_err(decode_error)?,
    })
}

fn target_from_row(row: &PgRow) -> Result<PublishingTarget, ContentStoreError> {
    Ok(PublishingTarget {
        id: TargetId::from_uuid(row.try_get("id").map_err(decode_error)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode_error)?),
        site_url: row.try_get("site_url").map_err(decode_error)?,
        username: row.try_get("username").map_err(decode_error)?,
        credentials: EncryptedSecret {
            encrypted: row.try_get("credential_encrypted").map_err(decode_error)?,
            iv: row.try_get("credential_iv").map_err(decode_error)?,
            tag: row.try_get("credential_tag").map_err(decode_error)?,
        },
        connected: row.try_get("connected").map_err(decode_error)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ContentStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            ContentStoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            ContentStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => ContentStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
