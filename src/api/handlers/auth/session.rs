//! Current session lookup.
//!
//! The gatekeeper has already verified the token and checked the blacklist,
//! so a cache hit is enough to answer. A miss falls through to the durable
//! store and repopulates the cache.

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::types::SessionResponse;
use crate::{
    api::error::ErrorResponse,
    auth::{AuthError, AuthFailure, AuthState, Identity, SessionLookup},
};

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Session bound to the presented access token", body = SessionResponse),
        (status = 401, description = "Token refused or session no longer exists", body = ErrorResponse),
        (status = 502, description = "Session store is unavailable", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn current_session(
    Extension(state): Extension<Arc<AuthState>>,
    identity: Identity,
) -> Result<Json<SessionResponse>, AuthError> {
    let deadline = state.deadline();

    let cached = deadline
        .best_effort(
            "session.cache_get",
            state.sessions().cache_get(&identity.token),
        )
        .await
        .flatten();
    if cached.as_deref() == Some(identity.user_id.as_str()) {
        debug!("session served from cache");
        return Ok(Json(SessionResponse {
            user_id: identity.user_id,
            email: identity.email,
            expires_at: identity.expires_at,
        }));
    }

    let lookup = deadline
        .run(
            "session.lookup",
            state.sessions().get_by_token(&identity.token),
        )
        .await?;

    match lookup {
        SessionLookup::Found(session) => {
            deadline
                .best_effort(
                    "session.cache_set",
                    state.sessions().cache_set(
                        &identity.token,
                        &session.user_id,
                        session.remaining(),
                    ),
                )
                .await;
            Ok(Json(SessionResponse {
                user_id: session.user_id,
                email: identity.email,
                expires_at: session.expires_at,
            }))
        }
        SessionLookup::NotFound => Err(AuthFailure::SessionEnded.into()),
    }
}
