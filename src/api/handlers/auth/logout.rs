//! Logout of the current session, or of every session of the caller.

use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

use super::types::{LogoutAllResponse, MessageResponse};
use crate::{
    api::error::ErrorResponse,
    auth::{revocation_ttl, AuthError, AuthState, Deadline, Identity, Session, TokenDigest},
};

/// Blacklist `token` for the rest of its validity. Expired tokens need no entry.
async fn revoke(
    state: &AuthState,
    deadline: &Deadline,
    token: &TokenDigest,
    expires_at: DateTime<Utc>,
) -> Result<(), AuthError> {
    if let Some(ttl) = revocation_ttl(expires_at) {
        deadline
            .run("blacklist.add", state.blacklist().add(token, ttl))
            .await?;
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Access token revoked and session ended", body = MessageResponse),
        (status = 401, description = "Missing, invalid, expired or revoked token", body = ErrorResponse),
        (status = 502, description = "Token could not be revoked", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn logout(
    Extension(state): Extension<Arc<AuthState>>,
    identity: Identity,
) -> Result<Json<MessageResponse>, AuthError> {
    let deadline = state.deadline();

    // Must succeed; the session cleanup below is best-effort.
    revoke(&state, &deadline, &identity.token, identity.expires_at).await?;

    deadline
        .best_effort("session.delete", state.sessions().delete(&identity.token))
        .await;
    deadline
        .best_effort(
            "session.cache_invalidate",
            state.sessions().cache_invalidate(&identity.token),
        )
        .await;

    info!("user logged out");

    Ok(Json(MessageResponse {
        message: "logged out successfully".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/logout/all",
    responses(
        (status = 200, description = "Every session of the caller ended", body = LogoutAllResponse),
        (status = 401, description = "Missing, invalid, expired or revoked token", body = ErrorResponse),
        (status = 502, description = "Sessions could not be ended", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn logout_all(
    Extension(state): Extension<Arc<AuthState>>,
    identity: Identity,
) -> Result<Json<LogoutAllResponse>, AuthError> {
    let deadline = state.deadline();

    // Rows are deleted only after every listed token is revoked.
    let listed = deadline
        .run(
            "session.list",
            state.sessions().sessions_for_user(&identity.user_id),
        )
        .await?;

    let mut revoked: Vec<TokenDigest> = Vec::with_capacity(listed.len() + 1);
    let presented = std::iter::once((identity.token.clone(), identity.expires_at));
    for (token, expires_at) in listed
        .iter()
        .map(|session| (session.token.clone(), session.expires_at))
        .chain(presented)
    {
        if revoked.contains(&token) {
            continue;
        }
        revoke(&state, &deadline, &token, expires_at).await?;
        revoked.push(token);
    }

    let removed = deadline
        .run(
            "session.delete_all",
            state.sessions().delete_all_for_user(&identity.user_id),
        )
        .await?;

    // Sessions created between the listing and the delete.
    let late: Vec<&Session> = removed
        .iter()
        .filter(|session| !revoked.contains(&session.token))
        .collect();
    for session in late {
        revoke(&state, &deadline, &session.token, session.expires_at).await?;
        revoked.push(session.token.clone());
    }

    for token in &revoked {
        deadline
            .best_effort(
                "session.cache_invalidate",
                state.sessions().cache_invalidate(token),
            )
            .await;
    }

    info!(sessions = removed.len(), "user logged out of all sessions");

    Ok(Json(LogoutAllResponse {
        message: "logged out of all sessions".to_string(),
        sessions: removed.len(),
    }))
}
