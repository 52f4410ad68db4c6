//! Bearer-token gate for protected routes.
//!
//! Flow Overview:
//! 1) Read `Authorization: Bearer <token>`.
//! 2) Verify signature, algorithm, expiry and type (`access` only).
//! 3) Refuse blacklisted tokens.
//! 4) Insert the caller's [`Identity`] into request extensions for handlers.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::utils::extract_bearer_token;
use crate::auth::{
    verify_token, AuthError, AuthFailure, AuthState, Identity, Revocation, TokenType,
};

/// Middleware guarding every route that needs an authenticated caller.
///
/// # Errors
/// Returns [`AuthError::Authentication`] for any refused token and
/// [`AuthError::Dependency`] if the blacklist cannot be consulted.
pub async fn require_identity(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer_token(request.headers()).inspect_err(|failure| {
        debug!(reason = failure.as_str(), "gatekeeper rejected request");
    })?;

    let deadline = state.deadline();
    let identity = verify_token(
        &state,
        &deadline,
        &token,
        TokenType::Access,
        Revocation::Enforce,
    )
    .await?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::Authentication(AuthFailure::Missing))
    }
}
