use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use agencyhub_infra::jobs::ProcessError;

pub fn process_error_to_response(err: ProcessError) -> axum::response::Response {
    match err {
        ProcessError::DecryptionUnavailable(e) => json_error(StatusCode::UNAUTHORIZED, e.to_string()),
        ProcessError::Store(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": message.into(),
        })),
    )
        .into_response()
}
