use axum::{Router, routing::post};

pub mod jobs;
pub mod system;

/// Router for the endpoints guarded by the cron secret.
pub fn router() -> Router {
    Router::new().route("/process-scheduled-jobs", post(jobs::process_scheduled_jobs))
}
