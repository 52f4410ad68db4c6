//! Error taxonomy shared by the auth components and the HTTP layer.

use std::time::Duration;

/// Why a token or credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization` header.
    Missing,
    /// `Authorization` header present but not `Bearer <token>`.
    Malformed,
    /// Bad signature, unexpected algorithm, or undecodable token.
    Invalid,
    /// `exp` has elapsed.
    Expired,
    /// Token is on the blacklist.
    Revoked,
    /// Refresh token presented where an access token is expected, or vice versa.
    WrongType,
    /// The identity collaborator refused the credentials.
    BadCredentials,
    /// Token verifies but its session no longer exists.
    SessionEnded,
}

impl AuthFailure {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::WrongType => "wrong_type",
            Self::BadCredentials => "bad_credentials",
            Self::SessionEnded => "session_ended",
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Missing => "missing authorization header",
            Self::Malformed => "invalid authorization format",
            Self::Invalid => "invalid token",
            Self::Expired => "token expired",
            Self::Revoked => "token has been revoked",
            Self::WrongType => "unexpected token type",
            Self::BadCredentials => "invalid credentials",
            Self::SessionEnded => "session not found",
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("too many failed login attempts")]
    Lockout,

    #[error("dependency unavailable: {0}")]
    Dependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthFailure> for AuthError {
    fn from(failure: AuthFailure) -> Self {
        Self::Authentication(failure)
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_codes_are_stable() {
        assert_eq!(AuthFailure::Missing.as_str(), "missing");
        assert_eq!(AuthFailure::WrongType.to_string(), "wrong_type");
        assert_eq!(
            AuthError::from(AuthFailure::Expired).to_string(),
            "authentication failed: expired"
        );
    }
}
