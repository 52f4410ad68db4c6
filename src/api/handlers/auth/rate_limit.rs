//! Per-client rate limiting middleware.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::warn;

use super::utils::client_ip;
use crate::auth::{AuthError, AuthState, RateLimitDecision};

/// Requests without a peer address share one bucket.
const UNKNOWN_CLIENT: &str = "unknown";

/// Admit or reject the request against the client's sliding window.
///
/// # Errors
/// Returns [`AuthError::RateLimited`] with the time until a slot frees up.
pub async fn limit_by_client(
    State(state): State<Arc<AuthState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let key = client_ip(connect_info.as_ref()).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    match state.rate_limiter().check(&key) {
        RateLimitDecision::Allowed => Ok(next.run(request).await),
        RateLimitDecision::Limited { retry_after } => {
            warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
            Err(AuthError::RateLimited { retry_after })
        }
    }
}
