//! Auth handlers and the middleware in front of them.
//!
//! ## Route Groups
//!
//! - **Public, rate-limited:** `/login`, `/refresh`, `/validate`.
//! - **Protected, rate-limited:** `/logout`, `/logout/all`, `/session`. The
//!   rate limit runs before the gatekeeper so unauthenticated floods are
//!   throttled too.
//!
//! ## Lockout
//!
//! 5 failed logins for an email within a trailing 15 minutes refuse further
//! logins for that email with `429 too_many_failed_attempts`, even when the
//! password is correct.

mod gatekeeper;
pub mod login;
pub mod logout;
mod rate_limit;
pub mod refresh;
pub mod session;
pub mod types;
mod utils;
pub mod validate;

pub use gatekeeper::require_identity;
pub use rate_limit::limit_by_client;
