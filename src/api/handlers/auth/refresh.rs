//! Refresh token rotation.
//!
//! A refresh token is single-use. The new pair and its session are written
//! first, then the presented token is claimed with an atomic set-if-absent on
//! the blacklist. Only the caller that creates the entry gets the new pair, so
//! a replayed or concurrently reused token is refused, and a failed session
//! write leaves the presented token usable.

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::types::RefreshRequest;
use crate::{
    api::error::ErrorResponse,
    auth::{
        revocation_ttl, verify_token, AuthError, AuthFailure, AuthState, Revocation, Session,
        TokenDigest, TokenPair, TokenType,
    },
};

#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Refresh token consumed, new pair issued", body = TokenPair),
        (status = 400, description = "Missing refresh token", body = ErrorResponse),
        (status = 401, description = "Invalid, expired, reused or wrong-type token", body = ErrorResponse),
        (status = 502, description = "A backing store is unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let refresh_token = payload
        .map(|Json(request)| request.refresh_token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::Validation("refresh_token is required".to_string()))?;

    let deadline = state.deadline();

    // The claim below is the revocation check.
    let presented = verify_token(
        &state,
        &deadline,
        &refresh_token,
        TokenType::Refresh,
        Revocation::Skip,
    )
    .await?;

    let ttl = revocation_ttl(presented.expires_at).ok_or(AuthFailure::Expired)?;

    let (pair, access) = state
        .issuer()
        .issue_with_claims(&presented.user_id, &presented.email)?;
    let token = TokenDigest::of(&pair.access_token);
    let session = Session::new(&presented.user_id, token.clone(), access.expires_at());

    deadline
        .run("session.create", state.sessions().create(&session))
        .await?;

    let claimed = deadline
        .run(
            "blacklist.add",
            state.blacklist().add(&presented.token, ttl),
        )
        .await?;
    if !claimed {
        warn!(user_id = %presented.user_id, "refused reuse of a consumed refresh token");
        deadline
            .best_effort("session.delete", state.sessions().delete(&token))
            .await;
        return Err(AuthFailure::Revoked.into());
    }

    deadline
        .best_effort(
            "session.cache_set",
            state
                .sessions()
                .cache_set(&token, &presented.user_id, session.remaining()),
        )
        .await;

    info!(user_id = %presented.user_id, "refresh token rotated");

    Ok(Json(pair))
}
