//! Postgres-backed job store.
//!
//! The queue lives in the `scheduled_jobs` table. Claiming is a single
//! `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING`
//! statement, so overlapping processor invocations skip each other's rows
//! instead of double-delivering them.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` (enqueue only) |
//! | Database (check constraint) | `23514` | `InvalidTransition` |
//! | Database (other), PoolClosed, Io, ... | any | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Span, instrument};

use agencyhub_core::{ContentId, TenantId};
use agencyhub_scheduling::{Job, JobId, JobStatus, JobTransition, JobType};

use super::store::{JobStore, JobStoreError};

const JOB_COLUMNS: &str = "id, tenant_id, job_type, status, scheduled_for, attempts, max_attempts, \
     started_at, completed_at, error_message, content_id, payload, created_at, updated_at";

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Distinguish "no such job" from "job is not in a state that allows
    /// this transition" after a guarded update touched no rows.
    async fn explain_missed_update(&self, job_id: JobId) -> JobStoreError {
        let row = sqlx::query("SELECT status, attempts, max_attempts FROM scheduled_jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await;

        match row {
            Ok(None) => JobStoreError::NotFound(job_id),
            Ok(Some(row)) => {
                let status: String = row.try_get("status").unwrap_or_default();
                let attempts: i32 = row.try_get("attempts").unwrap_or_default();
                let max_attempts: i32 = row.try_get("max_attempts").unwrap_or_default();
                JobStoreError::InvalidTransition(format!(
                    "job {job_id} is {status} with {attempts}/{max_attempts} attempts"
                ))
            }
            Err(e) => map_sqlx_error("explain_missed_update", e),
        }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type), err)]
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (
                id, tenant_id, job_type, status, scheduled_for, attempts, max_attempts,
                started_at, completed_at, error_message, content_id, payload, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.tenant_id.as_uuid())
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.scheduled_for)
        .bind(to_db_count(job.attempts)?)
        .bind(to_db_count(job.max_attempts)?)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(job.content_id.map(uuid::Uuid::from))
        .bind(&job.payload)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("enqueue", e)
            }
        })?;

        Ok(job.id)
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(claimed = tracing::field::Empty), err)]
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET status = 'running',
                started_at = $1,
                attempts = attempts + 1,
                updated_at = $1
            WHERE status = 'pending'
              AND id IN (
                SELECT id
                FROM scheduled_jobs
                WHERE status = 'pending'
                  AND scheduled_for <= $1
                  AND attempts < max_attempts
                ORDER BY scheduled_for ASC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
              )
            RETURNING {JOB_COLUMNS}
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim_due", e))?;

        let mut jobs = rows
            .iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING does not preserve the subquery order.
        jobs.sort_by_key(|j| (j.scheduled_for, j.created_at));

        Span::current().record("claimed", jobs.len());
        Ok(jobs)
    }

    #[instrument(skip(self, transition), fields(job_id = %job_id, to = transition.target_status().as_str()), err)]
    async fn apply(&self, job_id: JobId, transition: &JobTransition) -> Result<(), JobStoreError> {
        let result = match transition {
            JobTransition::Completed { completed_at } => {
                sqlx::query(
                    r#"
                    UPDATE scheduled_jobs
                    SET status = 'completed', completed_at = $2, updated_at = $2
                    WHERE id = $1 AND status = 'running'
                    "#,
                )
                .bind(job_id.as_uuid())
                .bind(completed_at)
                .execute(&*self.pool)
                .await
            }
            JobTransition::Retry {
                scheduled_for,
                error,
                decided_at,
            } => {
                transition
                    .check_schedule(None)
                    .map_err(|e| JobStoreError::InvalidTransition(e.to_string()))?;
                sqlx::query(
                    r#"
                    UPDATE scheduled_jobs
                    SET status = 'pending', scheduled_for = $2, error_message = $3, updated_at = $4
                    WHERE id = $1 AND status = 'running' AND attempts < max_attempts
                      AND (started_at IS NULL OR started_at <= $2)
                    "#,
                )
                .bind(job_id.as_uuid())
                .bind(scheduled_for)
                .bind(error)
                .bind(decided_at)
                .execute(&*self.pool)
                .await
            }
            JobTransition::Failed { error, decided_at } => {
                sqlx::query(
                    r#"
                    UPDATE scheduled_jobs
                    SET status = 'failed', error_message = $2, updated_at = $3
                    WHERE id = $1 AND status = 'running' AND attempts >= max_attempts
                    "#,
                )
                .bind(job_id.as_uuid())
                .bind(error)
                .bind(decided_at)
                .execute(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("apply", e))?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(job_id).await);
        }
        Ok(())
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| JobStoreError::Storage(format!("failed to decode job row: {e}"));

    let status: String = row.try_get("status").map_err(decode)?;
    let job_type: String = row.try_get("job_type").map_err(decode)?;
    let attempts: i32 = row.try_get("attempts").map_err(decode)?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(decode)?;
    let content_id: Option<uuid::Uuid> = row.try_get("content_id").map_err(decode)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
        job_type: JobType::parse(&job_type),
        status: JobStatus::parse(&status).map_err(|e| JobStoreError::Storage(e.to_string()))?,
        scheduled_for: row.try_get("scheduled_for").map_err(decode)?,
        attempts: from_db_count("attempts", attempts)?,
        max_attempts: from_db_count("max_attempts", max_attempts)?,
        started_at: row.try_get("started_at").map_err(decode)?,
        completed_at: row.try_get("completed_at").map_err(decode)?,
        error_message: row.try_get("error_message").map_err(decode)?,
        content_id: content_id.map(ContentId::from_uuid),
        payload: row.try_get("payload").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn to_db_count(value: u32) -> Result<i32, JobStoreError> {
    i32::try_from(value).map_err(|_| JobStoreError::Storage(format!("counter out of range: {value}")))
}

fn from_db_count(column: &str, value: i32) -> Result<u32, JobStoreError> {
    u32::try_from(value)
        .map_err(|_| JobStoreError::Storage(format!("negative {column} in job row: {value}")))
}

/// Map SQLx errors to `JobStoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => JobStoreError::InvalidTransition(msg),
                _ => JobStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use agencyhub_scheduling::RetryPolicy;
    use chrono::Duration;
    use serde_json::json;

    use crate::db;

    const FIXTURE_TAG: &str = "postgres_job_store";

    /// Far enough in the past that no real row is due before it.
    fn fixture_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn fixture_store() -> Option<(PostgresJobStore, PgPool)> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = db::connect(&url).await.unwrap();
        db::apply_schema(&pool).await.unwrap();
        sqlx::query("DELETE FROM scheduled_jobs WHERE payload ->> 'fixture' = $1")
            .bind(FIXTURE_TAG)
            .execute(&pool)
            .await
            .unwrap();
        Some((PostgresJobStore::new(pool.clone()), pool))
    }

    fn fixture_job(tenant_id: TenantId, at: DateTime<Utc>) -> Job {
        Job::new(tenant_id, JobType::PublishArticle, at).with_payload(json!({ "fixture": FIXTURE_TAG }))
    }

    #[test]
    fn counters_outside_the_column_range_are_rejected() {
        assert!(to_db_count(u32::MAX).is_err());
        assert_eq!(to_db_count(3).unwrap(), 3);
        assert!(from_db_count("attempts", -1).is_err());
    }

    #[tokio::test]
    #[ignore] // needs DATABASE_URL pointing at a scratch database
    async fn claim_and_transitions_against_postgres() {
        let Some((store, pool)) = fixture_store().await else {
            return;
        };
        let tenant = TenantId::new();
        let base = fixture_time();
        let now = base + Duration::hours(3);

        let newest = store.enqueue(fixture_job(tenant, base + Duration::hours(2))).await.unwrap();
        let oldest = store.enqueue(fixture_job(tenant, base)).await.unwrap();
        let middle = store.enqueue(fixture_job(tenant, base + Duration::hours(1))).await.unwrap();
        store
            .enqueue(fixture_job(tenant, now + Duration::days(3650)))
            .await
            .unwrap();

        let err = store.enqueue(store.get(oldest).await.unwrap().unwrap()).await.unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyExists(id) if id == oldest));

        let first = store.claim_due(now, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![oldest, middle]);
        for job in &first {
            assert_eq!(job.status, JobStatus::Running);
            assert_eq!(job.attempts, 1);
            assert_eq!(job.started_at, Some(now));
        }

        let rest = store.claim_due(now, 10).await.unwrap();
        assert_eq!(rest.iter().map(|j| j.id).collect::<Vec<_>>(), vec![newest]);

        store.apply(oldest, &JobTransition::completed(now)).await.unwrap();
        let again = store.apply(oldest, &JobTransition::completed(now)).await;
        assert!(matches!(again, Err(JobStoreError::InvalidTransition(_))));

        let unknown = store.apply(JobId::new(), &JobTransition::completed(now)).await;
        assert!(matches!(unknown, Err(JobStoreError::NotFound(_))));

        let before_claim = JobTransition::Retry {
            scheduled_for: now - Duration::minutes(30),
            error: "late".to_string(),
            decided_at: now - Duration::hours(1),
        };
        let rejected = store.apply(middle, &before_claim).await;
        assert!(matches!(rejected, Err(JobStoreError::InvalidTransition(_))));

        let decided = now + Duration::seconds(5);
        let running = store.get(middle).await.unwrap().unwrap();
        let retry = JobTransition::after_failure(&running, "remote error", &RetryPolicy::default(), decided);
        store.apply(middle, &retry).await.unwrap();

        let stored = store.get(middle).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.scheduled_for, decided + Duration::minutes(2));
        assert_eq!(stored.updated_at, decided);
        assert_eq!(stored.error_message.as_deref(), Some("remote error"));

        // Overlapping claimers skip each other's locked rows. The retried
        // job is due again by then too.
        let later = now + Duration::hours(1);
        let mut enqueued = HashSet::from([middle]);
        for i in 0..8 {
            let job = fixture_job(tenant, now + Duration::minutes(i));
            enqueued.insert(store.enqueue(job).await.unwrap());
        }

        let (a, b) = tokio::join!(store.claim_due(later, 5), store.claim_due(later, 5));
        let claimed: Vec<_> = a.unwrap().into_iter().chain(b.unwrap()).map(|j| j.id).collect();
        let distinct: HashSet<_> = claimed.iter().copied().collect();
        assert_eq!(distinct.len(), claimed.len());
        assert_eq!(distinct, enqueued);

        sqlx::query("DELETE FROM scheduled_jobs WHERE tenant_id = $1")
            .bind(tenant.as_uuid())
            .execute(&pool)
            .await
            .unwrap();
    }

    #[test]
    fn pool_closed_maps_to_storage_error() {
        let err = map_sqlx_error("claim_due", sqlx::Error::PoolClosed);
        match err {
            JobStoreError::Storage(msg) => assert!(msg.contains("claim_due")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
