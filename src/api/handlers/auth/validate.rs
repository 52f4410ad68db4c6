use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::types::{ValidateRequest, ValidateResponse};
use crate::{
    api::error::ErrorResponse,
    auth::{verify_token, AuthError, AuthState, Revocation, TokenType},
};

#[utoipa::path(
    post,
    path = "/validate",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Verdict on the presented access token", body = ValidateResponse),
        (status = 400, description = "Missing token", body = ErrorResponse),
        (status = 502, description = "Revocation status could not be checked", body = ErrorResponse),
    ),
    tag = "auth"
)]
// service-to-service token check; a refused token is a verdict, not an error
#[instrument(skip_all)]
pub async fn validate(
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<ValidateRequest>>,
) -> Result<Json<ValidateResponse>, AuthError> {
    let token = payload
        .map(|Json(request)| request.token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::Validation("token is required".to_string()))?;

    let deadline = state.deadline();

    match verify_token(
        &state,
        &deadline,
        &token,
        TokenType::Access,
        Revocation::Enforce,
    )
    .await
    {
        Ok(identity) => Ok(Json(ValidateResponse {
            valid: true,
            user_id: Some(identity.user_id),
            email: Some(identity.email),
        })),
        Err(AuthError::Authentication(failure)) => {
            debug!(reason = failure.as_str(), "token failed validation");
            Ok(Json(ValidateResponse::invalid()))
        }
        Err(err) => Err(err),
    }
}
