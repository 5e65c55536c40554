//! Batch claiming of due jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use agencyhub_scheduling::Job;

use super::store::{JobStore, JobStoreError};

pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// Claims up to `batch_limit` due jobs per call.
///
/// Due means `pending`, `scheduled_for <= now` and `attempts < max_attempts`.
/// Jobs come back oldest `scheduled_for` first, already `running` with the
/// attempt counted; the atomicity of that step belongs to the store.
#[derive(Clone)]
pub struct JobClaimer {
    store: Arc<dyn JobStore>,
    batch_limit: usize,
}

impl JobClaimer {
    pub fn new(store: Arc<dyn JobStore>, batch_limit: usize) -> Self {
        Self {
            store,
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    pub async fn claim(&self, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.store.claim_due(now, self.batch_limit).await?;
        debug!(claimed = jobs.len(), limit = self.batch_limit, "claimed due jobs");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use agencyhub_core::TenantId;
    use agencyhub_scheduling::{JobStatus, JobType};
    use chrono::Duration;

    #[tokio::test]
    async fn claims_at_most_the_batch_limit() {
        let store = InMemoryJobStore::arc();
        let now = Utc::now();
        for i in 0..5 {
            store
                .enqueue(Job::new(
                    TenantId::new(),
                    JobType::PublishArticle,
                    now - Duration::minutes(i),
                ))
                .await
                .unwrap();
        }

        let claimer = JobClaimer::new(store.clone(), 2);
        let first = claimer.claim(now).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|j| j.status == JobStatus::Running && j.attempts == 1));
        assert!(first[0].scheduled_for <= first[1].scheduled_for);

        let second = claimer.claim(now).await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|j| !first.iter().any(|f| f.id == j.id)));
    }

    #[test]
    fn zero_batch_limit_is_raised_to_one() {
        assert_eq!(JobClaimer::new(InMemoryJobStore::arc(), 0).batch_limit(), 1);
    }
}
