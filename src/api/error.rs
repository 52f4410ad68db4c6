//! JSON error envelope for [`AuthError`].

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, message: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            message: message.map(str::to_string),
        }
    }
}

/// Whole seconds, rounded up and never zero.
fn retry_after_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let secs = if retry_after.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    };
    secs.max(1)
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } | Self::Lockout => StatusCode::TOO_MANY_REQUESTS,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            Self::Validation(detail) => ErrorResponse::new("validation_error", Some(detail)),
            Self::Authentication(failure) => {
                ErrorResponse::new("authentication_error", Some(failure.message()))
            }
            Self::RateLimited { .. } => {
                ErrorResponse::new("rate_limited", Some("rate limit exceeded"))
            }
            Self::Lockout => ErrorResponse::new(
                "too_many_failed_attempts",
                Some("too many failed login attempts, try again later"),
            ),
            // Details stay in the logs.
            Self::Dependency(_) => ErrorResponse::new("dependency_error", None),
            Self::Internal(_) => ErrorResponse::new("internal_error", None),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("internal error: {detail}");
        }

        let mut response = (self.status(), Json(self.body())).into_response();

        if let Self::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds(retry_after).to_string())
            {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}
