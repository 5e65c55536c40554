use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors::json_error;

/// Shared secret the scheduler presents as a bearer token. `None` leaves the
/// guarded routes open.
#[derive(Clone, Default)]
pub struct CronAuthState {
    pub secret: Option<Arc<str>>,
}

impl CronAuthState {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(Arc::from),
        }
    }
}

pub async fn cron_auth_middleware(
    State(state): State<CronAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(secret) = &state.secret {
        let authorized = extract_bearer(req.headers())
            .map(|token| constant_time_eq(token.as_bytes(), secret.as_bytes()))
            .unwrap_or(false);
        if !authorized {
            tracing::warn!("rejected unauthorized processing request");
            return json_error(StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc ")).unwrap(), "abc");
        assert!(extract_bearer(&headers("Basic abc")).is_err());
        assert!(extract_bearer(&headers("Bearer   ")).is_err());
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }

    #[test]
    fn secrets_compare_exactly() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}
