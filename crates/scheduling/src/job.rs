//! The scheduled job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agencyhub_core::{ContentId, DomainError, DomainResult, TenantId};

use crate::retry::{RetryDecision, RetryPolicy};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job type; selects the handler.
///
/// Stored as a plain string tag. Tags without a known variant are kept in
/// `Other` so that they reach the executor and fail there like any other
/// unsupported job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    PublishArticle,
    PublishGmb,
    SendEmail,
    GenerateContent,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::PublishArticle => "publish_article",
            JobType::PublishGmb => "publish_gmb",
            JobType::SendEmail => "send_email",
            JobType::GenerateContent => "generate_content",
            JobType::Other(tag) => tag,
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag {
            "publish_article" => JobType::PublishArticle,
            "publish_gmb" => JobType::PublishGmb,
            "send_email" => JobType::SendEmail,
            "generate_content" => JobType::GenerateContent,
            other => JobType::Other(other.to_string()),
        }
    }
}

impl From<String> for JobType {
    fn from(tag: String) -> Self {
        JobType::parse(&tag)
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        job_type.as_str().to_string()
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for `scheduled_for`
    Pending,
    /// Claimed by a processor invocation
    Running,
    /// Handler succeeded
    Completed,
    /// Retries exhausted
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The single update applied to a running job once its handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// `running -> completed`
    Completed { completed_at: DateTime<Utc> },
    /// `running -> pending`, eligible again at `scheduled_for`
    Retry {
        scheduled_for: DateTime<Utc>,
        error: String,
        decided_at: DateTime<Utc>,
    },
    /// `running -> failed`; `scheduled_for` is left as it was
    Failed {
        error: String,
        decided_at: DateTime<Utc>,
    },
}

impl JobTransition {
    pub fn completed(now: DateTime<Utc>) -> Self {
        Self::Completed { completed_at: now }
    }

    /// Route a handler failure through the retry policy.
    pub fn after_failure(
        job: &Job,
        error: impl Into<String>,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let error = error.into();
        match policy.decide(job.attempts, job.max_attempts, now) {
            RetryDecision::Retry { at } => Self::Retry {
                scheduled_for: at,
                error,
                decided_at: now,
            },
            RetryDecision::GiveUp => Self::Failed {
                error,
                decided_at: now,
            },
        }
    }

    pub fn target_status(&self) -> JobStatus {
        match self {
            JobTransition::Completed { .. } => JobStatus::Completed,
            JobTransition::Retry { .. } => JobStatus::Pending,
            JobTransition::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobTransition::Completed { .. } => None,
            JobTransition::Retry { error, .. } | JobTransition::Failed { error, .. } => Some(error),
        }
    }

    /// When the transition was decided; becomes the row's `updated_at`.
    pub fn decided_at(&self) -> DateTime<Utc> {
        match self {
            JobTransition::Completed { completed_at } => *completed_at,
            JobTransition::Retry { decided_at, .. } | JobTransition::Failed { decided_at, .. } => {
                *decided_at
            }
        }
    }

    /// A retry may not be scheduled before it was decided, nor before the
    /// claim it follows.
    pub fn check_schedule(&self, started_at: Option<DateTime<Utc>>) -> DomainResult<()> {
        if let JobTransition::Retry {
            scheduled_for,
            decided_at,
            ..
        } = self
        {
            let floor = started_at.map_or(*decided_at, |s| s.max(*decided_at));
            if *scheduled_for < floor {
                return Err(DomainError::invariant(format!(
                    "retry scheduled for {scheduled_for} is earlier than {floor}"
                )));
            }
        }
        Ok(())
    }
}

/// A queued unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Owning agency
    pub tenant_id: TenantId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Not eligible for claiming before this instant
    pub scheduled_for: DateTime<Utc>,
    /// Claims so far; incremented exactly once per claim
    pub attempts: u32,
    pub max_attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Description of the last failure
    pub error_message: Option<String>,
    /// Domain record the job acts on
    pub content_id: Option<ContentId>,
    /// Free-form job data
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job due at `scheduled_for`.
    pub fn new(tenant_id: TenantId, job_type: JobType, scheduled_for: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            job_type,
            status: JobStatus::Pending,
            scheduled_for,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            started_at: None,
            completed_at: None,
            error_message: None,
            content_id: None,
            payload: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_content(mut self, content_id: ContentId) -> Self {
        self.content_id = Some(content_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether a claimer may pick this job up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.scheduled_for <= now
            && self.attempts < self.max_attempts
    }

    /// `pending -> running`: stamp `started_at` and count the attempt.
    pub fn claim(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_due(now) {
            return Err(DomainError::invariant(format!(
                "job {} is not claimable (status {}, attempts {}/{})",
                self.id,
                self.status.as_str(),
                self.attempts,
                self.max_attempts
            )));
        }

        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.attempts += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Apply the post-handler transition to a running job.
    pub fn apply(&mut self, transition: &JobTransition) -> DomainResult<()> {
        if self.status != JobStatus::Running {
            return Err(DomainError::invariant(format!(
                "job {} is {}, only running jobs can transition",
                self.id,
                self.status.as_str()
            )));
        }

        match transition {
            JobTransition::Completed { completed_at } => {
                self.status = JobStatus::Completed;
                self.completed_at = Some(*completed_at);
                self.updated_at = *completed_at;
            }
            JobTransition::Retry {
                scheduled_for,
                error,
                decided_at,
            } => {
                if self.attempts >= self.max_attempts {
                    return Err(DomainError::invariant(format!(
                        "job {} has exhausted its attempts and cannot be retried",
                        self.id
                    )));
                }
                transition.check_schedule(self.started_at)?;
                self.status = JobStatus::Pending;
                self.scheduled_for = *scheduled_for;
                self.error_message = Some(error.clone());
                self.updated_at = *decided_at;
            }
            JobTransition::Failed { error, decided_at } => {
                if self.attempts < self.max_attempts {
                    return Err(DomainError::invariant(format!(
                        "job {} still has attempts left and cannot fail permanently",
                        self.id
                    )));
                }
                self.status = JobStatus::Failed;
                self.error_message = Some(error.clone());
                self.updated_at = *decided_at;
            }
        }
        Ok(())
    }
}
