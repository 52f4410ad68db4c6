//! Per-request time budget for calls into external stores and services.

use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::{timeout_at, Instant};
use tracing::{error, warn};

use super::error::AuthError;

/// Absolute point in time by which a request must finish its I/O.
///
/// Every suspension point in a request (database, Redis, identity lookups)
/// goes through [`Deadline::run`], so a slow dependency surfaces as
/// [`AuthError::Dependency`] instead of holding the request open.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Await `fut` until the deadline, mapping both timeouts and failures to
    /// a dependency error. `what` names the operation in logs.
    ///
    /// # Errors
    /// Returns [`AuthError::Dependency`] if the deadline elapses or `fut` fails.
    pub async fn run<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match timeout_at(self.at, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!(operation = what, "dependency call failed: {err}");
                Err(AuthError::Dependency(what.to_string()))
            }
            Err(_) => {
                error!(operation = what, "dependency call exceeded request deadline");
                Err(AuthError::Dependency(format!("{what}: deadline exceeded")))
            }
        }
    }

    /// Like [`Deadline::run`] but for auxiliary writes: failures are logged
    /// and swallowed.
    pub async fn best_effort<T, E, F>(&self, what: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match timeout_at(self.at, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(operation = what, "best-effort call failed: {err}");
                None
            }
            Err(_) => {
                warn!(operation = what, "best-effort call exceeded request deadline");
                None
            }
        }
    }
}
