//! Postgres pool and bundled schema.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Tables for the job queue and the records publish handlers touch.
pub const SCHEMA: &str = include_str!("../migrations/0001_scheduled_jobs.sql");

pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Idempotent; every statement is `IF NOT EXISTS`.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("database schema applied");
    Ok(())
}
