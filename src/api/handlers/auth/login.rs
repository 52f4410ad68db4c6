//! Credential login.
//!
//! Flow Overview:
//! 1) Refuse the attempt if the email has 5 failures in the trailing 15 minutes.
//! 2) Ask the identity collaborator to check the credentials.
//! 3) Append the attempt to the audit log (best-effort).
//! 4) Issue a token pair and persist the session; the cache entry is best-effort.

use axum::{
    extract::{ConnectInfo, Extension},
    Json,
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, instrument, warn};

use super::{
    types::LoginRequest,
    utils::client_ip,
};
use crate::{
    api::error::ErrorResponse,
    auth::{
        attempts::{is_locked_out, lockout_window_start, normalize_email},
        AuthError, AuthFailure, AuthState, Session, TokenDigest, TokenPair, Verification,
    },
};

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted, token pair issued", body = TokenPair),
        (status = 400, description = "Missing email or password", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Rate limited or too many failed attempts", body = ErrorResponse),
        (status = 502, description = "A backing store or the identity provider is unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(state): Extension<Arc<AuthState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("invalid request body".to_string()));
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(AuthError::Validation(
            "email and password are required".to_string(),
        ));
    }

    let deadline = state.deadline();
    let ip = client_ip(connect_info.as_ref());

    let failures = deadline
        .run(
            "login_attempts.count",
            state
                .attempts()
                .count_recent_failures(&email, lockout_window_start(Utc::now())),
        )
        .await?;
    if is_locked_out(failures) {
        warn!(email = %email, failures, "login refused during lockout");
        return Err(AuthError::Lockout);
    }

    let verification = deadline
        .run(
            "identity.verify",
            state.identity().verify(&email, &request.password),
        )
        .await?;
    let accepted = matches!(verification, Verification::Accepted { .. });

    deadline
        .best_effort(
            "login_attempts.record",
            state
                .attempts()
                .record(&email, accepted, ip.as_deref(), Utc::now()),
        )
        .await;

    let Verification::Accepted { user_id } = verification else {
        info!(email = %email, "login rejected: invalid credentials");
        return Err(AuthFailure::BadCredentials.into());
    };

    let (pair, access) = state.issuer().issue_with_claims(&user_id, &email)?;
    let token = TokenDigest::of(&pair.access_token);
    let session = Session::new(&user_id, token.clone(), access.expires_at());

    deadline
        .run("session.create", state.sessions().create(&session))
        .await?;
    deadline
        .best_effort(
            "session.cache_set",
            state
                .sessions()
                .cache_set(&token, &user_id, session.remaining()),
        )
        .await;

    info!(user_id = %user_id, "login succeeded");

    Ok(Json(pair))
}
