//! Token revocation registry.
//!
//! Entries are keyed by [`TokenDigest`] and expire on their own; callers
//! derive the TTL from the revoked token's `exp` claim so an entry never
//! outlives (or under-lives) the token it revokes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{info_span, Instrument};

use super::token::TokenDigest;

const BLACKLIST_PREFIX: &str = "blacklist:";

/// TTL for a blacklist entry revoking a token that expires at `expires_at`,
/// or `None` once the token can no longer validate.
///
/// `exp` has one-second granularity and a token is still accepted during the
/// second it names, so the entry outlives `expires_at` by one second.
#[must_use]
pub fn revocation_ttl(expires_at: DateTime<Utc>) -> Option<Duration> {
    let valid_until = expires_at + chrono::Duration::seconds(1);
    (valid_until - Utc::now())
        .to_std()
        .ok()
        .filter(|ttl| !ttl.is_zero())
}

#[async_trait]
pub trait BlacklistRegistry: Send + Sync {
    /// Revoke `token` for `ttl`.
    ///
    /// Returns `true` if this call created the entry and `false` if the token
    /// was already revoked. Refresh rotation relies on this to stay single-use.
    async fn add(&self, token: &TokenDigest, ttl: Duration) -> Result<bool>;

    async fn is_blacklisted(&self, token: &TokenDigest) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Redis-backed registry shared by every replica.
#[derive(Clone)]
pub struct RedisBlacklist {
    conn: ConnectionManager,
}

impl RedisBlacklist {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn blacklist_key(token: &TokenDigest) -> String {
    format!("{BLACKLIST_PREFIX}{token}")
}

/// Redis rejects `PX 0`; anything shorter than a millisecond rounds up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl BlacklistRegistry for RedisBlacklist {
    async fn add(&self, token: &TokenDigest, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let span = info_span!("cache.command", cache.system = "redis", cache.operation = "SET NX");
        let reply: Option<String> = redis::cmd("SET")
            .arg(blacklist_key(token))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .instrument(span)
            .await
            .context("failed to write blacklist entry")?;
        Ok(reply.is_some())
    }

    async fn is_blacklisted(&self, token: &TokenDigest) -> Result<bool> {
        let mut conn = self.conn.clone();
        let span = info_span!("cache.command", cache.system = "redis", cache.operation = "EXISTS");
        let exists: bool = conn
            .exists(blacklist_key(token))
            .instrument(span)
            .await
            .context("failed to query blacklist")?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("redis ping failed")?;
        Ok(())
    }
}

/// Process-local registry for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryBlacklist {
    entries: Mutex<HashMap<TokenDigest, Instant>>,
}

impl MemoryBlacklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TokenDigest, Instant>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("blacklist lock poisoned"))
    }
}

#[async_trait]
impl BlacklistRegistry for MemoryBlacklist {
    async fn add(&self, token: &TokenDigest, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, expires_at| *expires_at > now);
        if entries.contains_key(token) {
            return Ok(false);
        }
        entries.insert(token.clone(), now + ttl);
        Ok(true)
    }

    async fn is_blacklisted(&self, token: &TokenDigest) -> Result<bool> {
        let entries = self.lock()?;
        Ok(entries
            .get(token)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entry_is_live_until_ttl_elapses() {
        let registry = MemoryBlacklist::new();
        let token = TokenDigest::of("access-token");

        assert!(!registry.is_blacklisted(&token).await.unwrap());
        assert!(registry
            .add(&token, Duration::from_millis(150))
            .await
            .unwrap());
        assert!(registry.is_blacklisted(&token).await.unwrap());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!registry.is_blacklisted(&token).await.unwrap());
    }

    #[tokio::test]
    async fn second_add_reports_existing_entry() {
        let registry = MemoryBlacklist::new();
        let token = TokenDigest::of("refresh-token");
        assert!(registry.add(&token, Duration::from_secs(60)).await.unwrap());
        assert!(!registry.add(&token, Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_can_be_added_again() {
        let registry = MemoryBlacklist::new();
        let token = TokenDigest::of("short");
        assert!(registry
            .add(&token, Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.add(&token, Duration::from_secs(1)).await.unwrap());
    }

    #[test]
    fn revocation_ttl_covers_remaining_validity() {
        let ttl = revocation_ttl(Utc::now() + chrono::Duration::seconds(60)).unwrap();
        assert!(ttl > Duration::from_secs(60));
        assert!(ttl <= Duration::from_secs(61));
        assert_eq!(
            revocation_ttl(Utc::now() - chrono::Duration::seconds(5)),
            None
        );
    }

    #[test]
    fn ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
        assert_eq!(blacklist_key(&TokenDigest::from_stored("abc".into())), "blacklist:abc");
    }
}
