//! Auth configuration and the shared state handed to every request.

use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

use super::{
    attempts::{LoginAttemptTracker, MemoryLoginAttemptTracker},
    blacklist::{BlacklistRegistry, MemoryBlacklist},
    deadline::Deadline,
    error::AuthError,
    identity::{IdentityVerifier, PermissiveVerifier},
    rate_limit::{RateLimitConfig, RateLimiter},
    session::SessionStore,
    token::{TokenIssuer, DEFAULT_ACCESS_TOKEN_TTL_SECONDS},
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_ttl_seconds: i64,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit: RateLimitConfig::default(),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit
    }
}

/// Everything a request needs: issuer, stores, collaborators and the limiter.
pub struct AuthState {
    config: AuthConfig,
    issuer: TokenIssuer,
    sessions: SessionStore,
    blacklist: Arc<dyn BlacklistRegistry>,
    attempts: Arc<dyn LoginAttemptTracker>,
    identity: Arc<dyn IdentityVerifier>,
    rate_limiter: RateLimiter,
}

impl AuthState {
    /// # Errors
    /// Returns [`AuthError::Internal`] if the signing secret or access token
    /// lifetime is unusable.
    pub fn new(
        config: AuthConfig,
        secret: &SecretString,
        sessions: SessionStore,
        blacklist: Arc<dyn BlacklistRegistry>,
        attempts: Arc<dyn LoginAttemptTracker>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Result<Self, AuthError> {
        let issuer = TokenIssuer::new(secret, config.access_ttl_seconds())?;
        let rate_limiter = RateLimiter::new(config.rate_limit());
        Ok(Self {
            config,
            issuer,
            sessions,
            blacklist,
            attempts,
            identity,
            rate_limiter,
        })
    }

    /// State backed entirely by process memory with the permissive identity
    /// verifier. Suitable for a single instance and for tests.
    ///
    /// # Errors
    /// Same as [`AuthState::new`].
    pub fn in_memory(config: AuthConfig, secret: &SecretString) -> Result<Self, AuthError> {
        Self::new(
            config,
            secret,
            SessionStore::in_memory(),
            Arc::new(MemoryBlacklist::new()),
            Arc::new(MemoryLoginAttemptTracker::new()),
            Arc::new(PermissiveVerifier),
        )
    }

    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: Arc<dyn LoginAttemptTracker>) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn blacklist(&self) -> &dyn BlacklistRegistry {
        self.blacklist.as_ref()
    }

    #[must_use]
    pub fn attempts(&self) -> &dyn LoginAttemptTracker {
        self.attempts.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityVerifier {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Fresh time budget for one request.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.request_timeout)
    }
}
