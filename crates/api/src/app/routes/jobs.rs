use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::dto::ProcessResponse;
use crate::app::errors::process_error_to_response;
use crate::app::services::AppServices;

/// Run one processing invocation over the due jobs.
pub async fn process_scheduled_jobs(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.processor.run().await {
        Ok(summary) => Json(ProcessResponse::from(summary)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "scheduled job processing aborted");
            process_error_to_response(e)
        }
    }
}
