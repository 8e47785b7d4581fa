//! The single place where errors become HTTP responses.

use axum::{
    Json,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use warden_core::{
    Error, ErrorKind,
    error::{RateLimitExceeded, SessionError},
};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// A `warden_core::Error` on its way out of a handler or middleware.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    /// The generic 401 used for every rejected access token.
    pub fn unauthorized() -> Self {
        Self(SessionError::MissingToken.into())
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    pub retry_after: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: String,
}

/// Internal error chain of a 5xx response, picked up by [`expose_diagnostics`].
#[derive(Debug, Clone)]
struct ErrorDetail {
    message: String,
    chain: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let Error::RateLimited(exceeded) = &self.0 {
            return rate_limited(exceeded);
        }

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let message = self.0.public_message();
        let errors = if self.0.kind() == ErrorKind::Validation {
            vec![message.clone()]
        } else {
            Vec::new()
        };

        let body = ErrorBody {
            success: false,
            message: message.clone(),
            errors,
            stack: None,
        };

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(ErrorDetail {
                message,
                chain: error_chain(&self.0),
            });
        }
        response
    }
}

fn rate_limited(exceeded: &RateLimitExceeded) -> Response {
    let body = RateLimitBody {
        success: false,
        error: "RATE_LIMIT_EXCEEDED",
        message: exceeded.message.clone(),
        retry_after: exceeded.retry_after_secs,
        limit: exceeded.limit,
        remaining: exceeded.remaining,
        reset_at: exceeded.reset_at.to_rfc3339(),
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(exceeded.retry_after_secs),
    );
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(exceeded.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(exceeded.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(exceeded.retry_after_secs));
    response
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = format!("Error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(&format!("\nCaused by: {cause}"));
        source = cause.source();
    }
    chain
}

/// Adds the internal error chain to 5xx error bodies as `stack`.
///
/// Only installed outside production.
pub async fn expose_diagnostics(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(detail) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let body = ErrorBody {
        success: false,
        message: detail.message,
        errors: Vec::new(),
        stack: Some(detail.chain),
    };
    (response.status(), Json(body)).into_response()
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use warden_core::error::{AuthError, StorageError, ValidationError};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(Error, StatusCode)> = vec![
            (
                ValidationError::MissingField("Email is required".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                StorageError::MalformedId("id".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (AuthError::AccountLocked.into(), StatusCode::UNAUTHORIZED),
            (SessionError::Expired.into(), StatusCode::UNAUTHORIZED),
            (
                StorageError::Conflict("dup".into()).into(),
                StatusCode::CONFLICT,
            ),
            (StorageError::NotFound.into(), StatusCode::NOT_FOUND),
            (
                StorageError::Database("boom".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[test]
    fn test_rate_limit_response_headers() {
        let exceeded = RateLimitExceeded {
            limit: 5,
            remaining: 0,
            retry_after_secs: 42,
            reset_at: Utc::now(),
            message: "slow down".to_string(),
        };
        let response = ApiError(exceeded.into()).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["ratelimit-limit"], "5");
        assert_eq!(response.headers()["ratelimit-remaining"], "0");
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let response =
            ApiError(StorageError::Database("secret table name".into()).into()).into_response();
        assert!(response.extensions().get::<ErrorDetail>().is_some());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
