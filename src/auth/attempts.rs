//! Login attempt audit log and brute-force lockout policy.
//!
//! Flow Overview:
//! 1) Before checking credentials, count failed attempts for the email in the
//!    trailing [`LOCKOUT_WINDOW_SECONDS`]. The window slides with every request.
//! 2) At [`LOCKOUT_THRESHOLD`] failures the login is refused outright, even if
//!    the password would have been correct.
//! 3) Every attempt that reaches the credential check is appended; rows are
//!    never updated or deleted by this service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::sync::Mutex;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const LOCKOUT_THRESHOLD: i64 = 5;
pub const LOCKOUT_WINDOW_SECONDS: i64 = 15 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub email: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait LoginAttemptTracker: Send + Sync {
    async fn record(
        &self,
        email: &str,
        success: bool,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn count_recent_failures(&self, email: &str, since: DateTime<Utc>) -> Result<i64>;
}

/// Normalize an email so case and whitespace variants share one counter.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Start of the lockout window ending at `now`.
#[must_use]
pub fn lockout_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(LOCKOUT_WINDOW_SECONDS)
}

#[must_use]
pub const fn is_locked_out(recent_failures: i64) -> bool {
    recent_failures >= LOCKOUT_THRESHOLD
}

#[derive(Clone, Debug)]
pub struct PgLoginAttemptTracker {
    pool: PgPool,
}

impl PgLoginAttemptTracker {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptTracker for PgLoginAttemptTracker {
    async fn record(
        &self,
        email: &str,
        success: bool,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO login_attempts (id, email, success, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(success)
            .bind(ip)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login attempt")?;
        Ok(())
    }

    async fn count_recent_failures(&self, email: &str, since: DateTime<Utc>) -> Result<i64> {
        // Served by the partial index on (email, created_at) WHERE success = false.
        let query = r"
            SELECT COUNT(*) AS failures
            FROM login_attempts
            WHERE email = $1 AND success = false AND created_at > $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count failed login attempts")?;
        Ok(row.get("failures"))
    }
}

/// Process-local audit log for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryLoginAttemptTracker {
    attempts: Mutex<Vec<LoginAttempt>>,
}

impl MemoryLoginAttemptTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded attempt, oldest first.
    ///
    /// # Errors
    /// Returns an error if the lock is poisoned.
    pub fn attempts(&self) -> Result<Vec<LoginAttempt>> {
        self.attempts
            .lock()
            .map(|attempts| attempts.clone())
            .map_err(|_| anyhow::anyhow!("login attempt log lock poisoned"))
    }
}

#[async_trait]
impl LoginAttemptTracker for MemoryLoginAttemptTracker {
    async fn record(
        &self,
        email: &str,
        success: bool,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut attempts = self
            .attempts
            .lock()
            .map_err(|_| anyhow::anyhow!("login attempt log lock poisoned"))?;
        attempts.push(LoginAttempt {
            id: Uuid::new_v4(),
            email: email.to_string(),
            success,
            ip_address: ip.map(str::to_string),
            created_at: at,
        });
        Ok(())
    }

    async fn count_recent_failures(&self, email: &str, since: DateTime<Utc>) -> Result<i64> {
        let attempts = self
            .attempts
            .lock()
            .map_err(|_| anyhow::anyhow!("login attempt log lock poisoned"))?;
        let count = attempts
            .iter()
            .filter(|a| a.email == email && !a.success && a.created_at > since)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn five_recent_failures_lock_the_email() {
        let tracker = MemoryLoginAttemptTracker::new();
        let now = Utc::now();
        for minutes_ago in 1..=5 {
            tracker
                .record(
                    "a@b.com",
                    false,
                    Some("10.0.0.1"),
                    now - Duration::minutes(minutes_ago),
                )
                .await
                .unwrap();
        }

        let failures = tracker
            .count_recent_failures("a@b.com", lockout_window_start(now))
            .await
            .unwrap();
        assert_eq!(failures, 5);
        assert!(is_locked_out(failures));
    }

    #[tokio::test]
    async fn failures_outside_the_window_do_not_count() {
        let tracker = MemoryLoginAttemptTracker::new();
        let now = Utc::now();
        tracker
            .record("a@b.com", false, None, now - Duration::minutes(16))
            .await
            .unwrap();
        for _ in 0..4 {
            tracker.record("a@b.com", false, None, now).await.unwrap();
        }

        let failures = tracker
            .count_recent_failures("a@b.com", lockout_window_start(now))
            .await
            .unwrap();
        assert_eq!(failures, 4);
        assert!(!is_locked_out(failures));
    }

    #[tokio::test]
    async fn successes_and_other_emails_are_ignored() {
        let tracker = MemoryLoginAttemptTracker::new();
        let now = Utc::now();
        tracker.record("a@b.com", true, None, now).await.unwrap();
        tracker.record("c@d.com", false, None, now).await.unwrap();

        let failures = tracker
            .count_recent_failures("a@b.com", lockout_window_start(now))
            .await
            .unwrap();
        assert_eq!(failures, 0);
        assert_eq!(tracker.attempts().unwrap().len(), 2);
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }
}
