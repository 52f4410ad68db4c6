//! The single token verification routine.
//!
//! The gatekeeper on protected routes, `/validate`, and `/refresh` all go
//! through [`verify_token`], so a token refused on one path is refused on all.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use super::{
    deadline::Deadline,
    error::{AuthError, AuthFailure},
    state::AuthState,
    token::{Claims, TokenDigest, TokenType},
};

/// Whether the blacklist is consulted after the signature checks pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    Enforce,
    Skip,
}

/// Authenticated caller, inserted into request extensions by the gatekeeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub token: TokenDigest,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    fn from_claims(claims: &Claims, token: TokenDigest) -> Self {
        Self {
            user_id: claims.user_id.clone(),
            email: claims.email.clone(),
            token,
            expires_at: claims.expires_at(),
        }
    }

    /// Validity left on the presented token, zero once it has expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Verify `token` as a token of type `expected`.
///
/// Signature, algorithm, expiry and type are checked first so forged or
/// stale tokens never cost a blacklist round trip.
///
/// # Errors
/// [`AuthError::Authentication`] when the token is refused and
/// [`AuthError::Dependency`] when the blacklist cannot be queried.
pub async fn verify_token(
    state: &AuthState,
    deadline: &Deadline,
    token: &str,
    expected: TokenType,
    revocation: Revocation,
) -> Result<Identity, AuthError> {
    let claims = state.issuer().verify(token, expected)?;
    let digest = TokenDigest::of(token);

    if revocation == Revocation::Enforce {
        let revoked = deadline
            .run("blacklist.check", state.blacklist().is_blacklisted(&digest))
            .await?;
        if revoked {
            debug!(token = ?digest, "rejected revoked token");
            return Err(AuthFailure::Revoked.into());
        }
    }

    Ok(Identity::from_claims(&claims, digest))
}
