//! # authgate (Authentication & Session Lifecycle)
//!
//! `authgate` issues and verifies signed access/refresh token pairs, revokes
//! tokens, persists and caches sessions, detects brute-force login attempts,
//! and rate-limits request traffic.
//!
//! ## Tokens
//!
//! Access and refresh tokens are HS256-signed JWTs sharing one secret. Access
//! tokens live for `JWT_EXPIRY` minutes (default 15), refresh tokens for 7 days.
//! Verification rejects any other algorithm, so a token re-signed with `none`
//! or an asymmetric algorithm never validates.
//!
//! Raw tokens never reach a store: sessions, the blacklist, and the session
//! cache are all keyed by the SHA-256 digest of the token.
//!
//! ## Revocation
//!
//! Logout blacklists the presented access token and refresh rotation
//! blacklists the presented refresh token. Blacklist entries live exactly as
//! long as the token they revoke. The gatekeeper on protected routes and the
//! service-to-service `/validate` endpoint share one verification routine, so
//! both honour revocation.
//!
//! ## Abuse Protection
//!
//! - **Rate limit:** sliding window per client IP (`RATE_LIMIT` per
//!   `RATE_LIMIT_WINDOW`), with idle-key sweeping and a hard key cap.
//! - **Lockout:** 5 failed logins for an email within a trailing 15 minutes
//!   block further attempts for that email, even with the right password.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
