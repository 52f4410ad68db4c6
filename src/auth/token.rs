//! Token minting and verification.
//!
//! Both halves of a pair are HS256 JWTs signed with the same secret. The
//! `type` claim keeps them apart: refresh tokens are only accepted by the
//! refresh flow, access tokens everywhere else.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::{AuthError, AuthFailure};

/// Refresh tokens always live for 7 days.
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
/// One year.
pub const MAX_ACCESS_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Seconds of validity left, or `None` once the token has expired.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u64> {
        let left = self.exp - Utc::now().timestamp();
        u64::try_from(left).ok().filter(|secs| *secs > 0)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// SHA-256 digest of a raw token, base64url without padding.
///
/// This is the only form in which a token is persisted or used as a key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenDigest(String);

impl TokenDigest {
    #[must_use]
    pub fn of(token: &str) -> Self {
        let hash = Sha256::digest(token.as_bytes());
        Self(Base64UrlUnpadded::encode_string(&hash))
    }

    /// Wrap an already computed digest read back from a store.
    #[must_use]
    pub fn from_stored(digest: String) -> Self {
        Self(digest)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A prefix is enough to correlate log lines.
        let prefix = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "TokenDigest({prefix}…)")
    }
}

impl fmt::Display for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints and verifies signed token pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// # Errors
    /// Returns [`AuthError::Internal`] if the secret is empty or the access
    /// lifetime is outside `1..=MAX_ACCESS_TOKEN_TTL_SECONDS`.
    pub fn new(secret: &SecretString, access_ttl_seconds: i64) -> Result<Self, AuthError> {
        let secret = secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(AuthError::Internal("signing secret is empty".to_string()));
        }
        if !(1..=MAX_ACCESS_TOKEN_TTL_SECONDS).contains(&access_ttl_seconds) {
            return Err(AuthError::Internal(format!(
                "access token lifetime must be between 1s and {MAX_ACCESS_TOKEN_TTL_SECONDS}s, got {access_ttl_seconds}s"
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(access_ttl_seconds),
        })
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue a fresh access/refresh pair for `user_id`.
    ///
    /// # Errors
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<TokenPair, AuthError> {
        self.issue_with_claims(user_id, email).map(|(pair, _)| pair)
    }

    /// Like [`TokenIssuer::issue`], also returning the access token's claims
    /// so callers can align session expiry with `exp`.
    ///
    /// # Errors
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn issue_with_claims(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<(TokenPair, Claims), AuthError> {
        let now = Utc::now();
        let access = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let refresh = Claims {
            token_type: TokenType::Refresh,
            exp: (now + Duration::seconds(REFRESH_TOKEN_TTL_SECONDS)).timestamp(),
            jti: Uuid::new_v4().to_string(),
            ..access.clone()
        };

        let pair = TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        };
        Ok((pair, access))
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|err| AuthError::Internal(format!("failed to sign token: {err}")))
    }

    /// Check signature, algorithm, expiry and type.
    ///
    /// # Errors
    /// Returns the [`AuthFailure`] describing why the token was refused.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthFailure> {
        // Refuse anything but HS256 before touching the key.
        let header = decode_header(token).map_err(|_| AuthFailure::Invalid)?;
        if header.alg != SIGNING_ALGORITHM {
            debug!(alg = ?header.alg, "rejected token with unexpected algorithm");
            return Err(AuthFailure::Invalid);
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthFailure::Expired,
                _ => AuthFailure::Invalid,
            })?;

        if claims.token_type != expected {
            return Err(AuthFailure::WrongType);
        }

        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&SecretString::from("unit-test-secret"), 900).unwrap()
    }

    #[test]
    fn issued_access_token_verifies_with_same_identity() {
        let issuer = issuer();
        let pair = issuer.issue("user-1", "a@b.com").unwrap();

        let claims = issuer.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.exp - claims.iat, 900);

        let refresh = issuer.verify(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_eq!(refresh.exp - refresh.iat, REFRESH_TOKEN_TTL_SECONDS);
    }

    #[test]
    fn issued_claims_match_the_access_token() {
        let issuer = issuer();
        let (pair, claims) = issuer.issue_with_claims("user-1", "a@b.com").unwrap();
        assert_eq!(
            issuer.verify(&pair.access_token, TokenType::Access).unwrap(),
            claims
        );
    }

    #[test]
    fn pairs_issued_back_to_back_are_distinct() {
        let issuer = issuer();
        let first = issuer.issue("user-1", "a@b.com").unwrap();
        let second = issuer.issue("user-1", "a@b.com").unwrap();
        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn token_type_is_enforced() {
        let issuer = issuer();
        let pair = issuer.issue("user-1", "a@b.com").unwrap();
        assert_eq!(
            issuer.verify(&pair.refresh_token, TokenType::Access),
            Err(AuthFailure::WrongType)
        );
        assert_eq!(
            issuer.verify(&pair.access_token, TokenType::Refresh),
            Err(AuthFailure::WrongType)
        );
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let token = issuer
            .sign(&Claims {
                user_id: "user-1".to_string(),
                email: "a@b.com".to_string(),
                token_type: TokenType::Access,
                iat: now - 120,
                exp: now - 60,
                jti: "jti".to_string(),
            })
            .unwrap();
        assert_eq!(
            issuer.verify(&token, TokenType::Access),
            Err(AuthFailure::Expired)
        );
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let other = TokenIssuer::new(&SecretString::from("another-secret"), 900).unwrap();
        let pair = other.issue("user-1", "a@b.com").unwrap();
        assert_eq!(
            issuer().verify(&pair.access_token, TokenType::Access),
            Err(AuthFailure::Invalid)
        );
    }

    #[test]
    fn alg_none_and_foreign_algorithms_are_rejected() {
        let issuer = issuer();
        let pair = issuer.issue("user-1", "a@b.com").unwrap();
        let payload = pair.access_token.split('.').nth(1).unwrap();

        let none_header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{none_header}.{payload}.");
        assert_eq!(
            issuer.verify(&forged, TokenType::Access),
            Err(AuthFailure::Invalid)
        );

        // Same secret, different HMAC: still refused.
        let hs512 = encode(
            &Header::new(Algorithm::HS512),
            &issuer.verify(&pair.access_token, TokenType::Access).unwrap(),
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();
        assert_eq!(
            issuer.verify(&hs512, TokenType::Access),
            Err(AuthFailure::Invalid)
        );
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(
            issuer().verify("not-a-jwt", TokenType::Access),
            Err(AuthFailure::Invalid)
        );
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        assert!(TokenIssuer::new(&SecretString::from(""), 900).is_err());
        assert!(TokenIssuer::new(&SecretString::from("secret"), 0).is_err());
    }

    #[test]
    fn access_lifetime_is_bounded() {
        let secret = SecretString::from("secret");
        assert!(TokenIssuer::new(&secret, MAX_ACCESS_TOKEN_TTL_SECONDS).is_ok());
        assert!(TokenIssuer::new(&secret, MAX_ACCESS_TOKEN_TTL_SECONDS + 1).is_err());
        assert!(TokenIssuer::new(&secret, i64::MAX).is_err());
    }

    #[test]
    fn digest_is_stable_and_hides_the_token() {
        let a = TokenDigest::of("token-value");
        let b = TokenDigest::of("token-value");
        assert_eq!(a, b);
        assert_ne!(a, TokenDigest::of("token-value2"));
        assert!(!a.as_str().contains("token-value"));
        assert_eq!(a.as_str().len(), 43);
    }

    #[test]
    fn remaining_seconds_is_none_once_expired() {
        let now = Utc::now().timestamp();
        let mut claims = Claims {
            user_id: "u".to_string(),
            email: "e".to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp: now + 30,
            jti: "j".to_string(),
        };
        assert!(claims.remaining_seconds().is_some_and(|s| s <= 30));
        claims.exp = now - 1;
        assert_eq!(claims.remaining_seconds(), None);
    }
}
