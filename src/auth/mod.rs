//! Authentication and session lifecycle components.
//!
//! Each store is a trait with a networked backend (PostgreSQL or Redis) and an
//! in-memory backend. [`AuthState`] bundles them with the token issuer, the
//! identity collaborator and the rate limiter.

pub mod attempts;
pub mod blacklist;
pub mod deadline;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod session;
mod state;
pub mod token;
mod verify;

pub use attempts::{LoginAttemptTracker, MemoryLoginAttemptTracker, PgLoginAttemptTracker};
pub use blacklist::{revocation_ttl, BlacklistRegistry, MemoryBlacklist, RedisBlacklist};
pub use deadline::Deadline;
pub use error::{AuthError, AuthFailure, AuthResult};
pub use identity::{HttpIdentityVerifier, IdentityVerifier, PermissiveVerifier, Verification};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use session::{
    PgSessionRepository, RedisSessionCache, Session, SessionLookup, SessionStore,
};
pub use state::{AuthConfig, AuthState};
pub use token::{Claims, TokenDigest, TokenIssuer, TokenPair, TokenType};
pub use verify::{verify_token, Identity, Revocation};
