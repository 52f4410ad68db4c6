//! Session persistence: durable records plus a best-effort lookup cache.
//!
//! Flow Overview: login writes the session row (fatal on failure) and then the
//! cache entry (best-effort). Reads that need a trust decision go to the
//! durable store; the cache only short-circuits lookups it can answer. A cache
//! miss means "unknown", never "absent".

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use sqlx::{PgPool, Row};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::token::TokenDigest;

const SESSION_CACHE_PREFIX: &str = "session:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub token: TokenDigest,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(user_id: &str, token: TokenDigest, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            token,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }

    /// Time left before the session expires, zero once it has.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Durable session records.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<()>;

    /// Live session for `token`; expired rows are filtered out.
    async fn get_by_token(&self, token: &TokenDigest) -> Result<Option<Session>>;

    async fn delete(&self, token: &TokenDigest) -> Result<()>;

    /// Every stored session of `user_id`, expired rows included.
    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Remove every session of `user_id`, returning the removed rows.
    async fn delete_all_for_user(&self, user_id: &str) -> Result<Vec<Session>>;

    async fn ping(&self) -> Result<()>;
}

/// Best-effort token → user id cache.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn set(&self, token: &TokenDigest, user_id: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, token: &TokenDigest) -> Result<Option<String>>;

    async fn invalidate(&self, token: &TokenDigest) -> Result<()>;
}

/// Outcome of a durable lookup.
#[derive(Debug)]
pub enum SessionLookup {
    Found(Session),
    NotFound,
}

/// Durable store plus cache behind a single handle.
#[derive(Clone)]
pub struct SessionStore {
    durable: Arc<dyn SessionRepository>,
    cache: Arc<dyn SessionCache>,
}

impl SessionStore {
    #[must_use]
    pub fn new(durable: Arc<dyn SessionRepository>, cache: Arc<dyn SessionCache>) -> Self {
        Self { durable, cache }
    }

    /// In-memory durable store and cache.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemorySessionRepository::default()),
            Arc::new(MemorySessionCache::default()),
        )
    }

    /// # Errors
    /// Returns an error if the durable write fails.
    pub async fn create(&self, session: &Session) -> Result<()> {
        self.durable.create(session).await
    }

    /// # Errors
    /// Returns an error if the durable store cannot be queried.
    pub async fn get_by_token(&self, token: &TokenDigest) -> Result<SessionLookup> {
        Ok(self
            .durable
            .get_by_token(token)
            .await?
            .map_or(SessionLookup::NotFound, SessionLookup::Found))
    }

    /// # Errors
    /// Returns an error if the durable delete fails.
    pub async fn delete(&self, token: &TokenDigest) -> Result<()> {
        self.durable.delete(token).await
    }

    /// # Errors
    /// Returns an error if the durable store cannot be queried.
    pub async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        self.durable.sessions_for_user(user_id).await
    }

    /// # Errors
    /// Returns an error if the durable delete fails.
    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        self.durable.delete_all_for_user(user_id).await
    }

    /// # Errors
    /// Returns an error if the cache write fails; callers treat this as non-fatal.
    pub async fn cache_set(&self, token: &TokenDigest, user_id: &str, ttl: Duration) -> Result<()> {
        self.cache.set(token, user_id, ttl).await
    }

    /// # Errors
    /// Returns an error if the cache cannot be reached.
    pub async fn cache_get(&self, token: &TokenDigest) -> Result<Option<String>> {
        self.cache.get(token).await
    }

    /// # Errors
    /// Returns an error if the cache cannot be reached.
    pub async fn cache_invalidate(&self, token: &TokenDigest) -> Result<()> {
        self.cache.invalidate(token).await
    }

    /// # Errors
    /// Returns an error if the durable store is unreachable.
    pub async fn ping(&self) -> Result<()> {
        self.durable.ping().await
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token: TokenDigest::from_stored(row.get("token")),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<()> {
        let query = r"
            INSERT INTO sessions (id, user_id, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.id)
            .bind(&session.user_id)
            .bind(session.token.as_str())
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn get_by_token(&self, token: &TokenDigest) -> Result<Option<Session>> {
        let query = r"
            SELECT id, user_id, token, expires_at, created_at
            FROM sessions
            WHERE token = $1 AND expires_at > NOW()
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn delete(&self, token: &TokenDigest) -> Result<()> {
        let query = "DELETE FROM sessions WHERE token = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let query = r"
            SELECT id, user_id, token, expires_at, created_at
            FROM sessions
            WHERE user_id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list user sessions")?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let query = r"
            DELETE FROM sessions
            WHERE user_id = $1
            RETURNING id, user_id, token, expires_at, created_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user sessions")?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn ping(&self) -> Result<()> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("database ping failed")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisSessionCache {
    conn: ConnectionManager,
}

impl RedisSessionCache {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn cache_key(token: &TokenDigest) -> String {
    format!("{SESSION_CACHE_PREFIX}{token}")
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn set(&self, token: &TokenDigest, user_id: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let span = info_span!("cache.command", cache.system = "redis", cache.operation = "SET");
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = conn
            .pset_ex(cache_key(token), user_id, millis)
            .instrument(span)
            .await
            .context("failed to cache session")?;
        Ok(())
    }

    async fn get(&self, token: &TokenDigest) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let span = info_span!("cache.command", cache.system = "redis", cache.operation = "GET");
        let user_id: Option<String> = conn
            .get(cache_key(token))
            .instrument(span)
            .await
            .context("failed to read cached session")?;
        Ok(user_id)
    }

    async fn invalidate(&self, token: &TokenDigest) -> Result<()> {
        let mut conn = self.conn.clone();
        let span = info_span!("cache.command", cache.system = "redis", cache.operation = "DEL");
        let _: () = conn
            .del(cache_key(token))
            .instrument(span)
            .await
            .context("failed to invalidate cached session")?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<TokenDigest, Session>>,
}

impl MemorySessionRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TokenDigest, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: &Session) -> Result<()> {
        let mut sessions = self.lock()?;
        if sessions.contains_key(&session.token) {
            anyhow::bail!("duplicate session token");
        }
        sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get_by_token(&self, token: &TokenDigest) -> Result<Option<Session>> {
        let sessions = self.lock()?;
        Ok(sessions.get(token).filter(|s| s.is_live()).cloned())
    }

    async fn delete(&self, token: &TokenDigest) -> Result<()> {
        self.lock()?.remove(token);
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let sessions = self.lock()?;
        Ok(sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let mut sessions = self.lock()?;
        let tokens: Vec<TokenDigest> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.token.clone())
            .collect();
        Ok(tokens
            .iter()
            .filter_map(|token| sessions.remove(token))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: Mutex<HashMap<TokenDigest, (String, Instant)>>,
}

impl MemorySessionCache {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TokenDigest, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("session cache lock poisoned"))
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn set(&self, token: &TokenDigest, user_id: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(token.clone(), (user_id.to_string(), now + ttl));
        Ok(())
    }

    async fn get(&self, token: &TokenDigest) -> Result<Option<String>> {
        let entries = self.lock()?;
        Ok(entries
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(user_id, _)| user_id.clone()))
    }

    async fn invalidate(&self, token: &TokenDigest) -> Result<()> {
        self.lock()?.remove(token);
        Ok(())
    }
}
