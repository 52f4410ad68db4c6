//! Runs against a real Redis when `AUTHGATE_TEST_REDIS` is set, otherwise
//! every test returns early.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use authgate::auth::{
    session::SessionCache, BlacklistRegistry, RedisBlacklist, RedisSessionCache, TokenDigest,
};
use redis::aio::ConnectionManager;
use std::time::Duration;
use ulid::Ulid;

async fn connection() -> Option<ConnectionManager> {
    let Some(url) = std::env::var("AUTHGATE_TEST_REDIS")
        .ok()
        .filter(|v| !v.is_empty())
    else {
        eprintln!("AUTHGATE_TEST_REDIS not set, skipping");
        return None;
    };

    let client = redis::Client::open(url.as_str()).expect("invalid AUTHGATE_TEST_REDIS");
    Some(
        ConnectionManager::new(client)
            .await
            .expect("failed to connect to AUTHGATE_TEST_REDIS"),
    )
}

fn token() -> TokenDigest {
    TokenDigest::of(&Ulid::new().to_string())
}

#[tokio::test]
async fn blacklist_add_is_atomic_and_expires() {
    let Some(conn) = connection().await else { return };
    let blacklist = RedisBlacklist::new(conn);
    blacklist.ping().await.unwrap();

    let revoked = token();
    assert!(!blacklist.is_blacklisted(&revoked).await.unwrap());

    assert!(blacklist
        .add(&revoked, Duration::from_millis(800))
        .await
        .unwrap());
    assert!(!blacklist
        .add(&revoked, Duration::from_secs(60))
        .await
        .unwrap());
    assert!(blacklist.is_blacklisted(&revoked).await.unwrap());

    // The losing add must not have extended the entry.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(!blacklist.is_blacklisted(&revoked).await.unwrap());
}

#[tokio::test]
async fn session_cache_set_get_invalidate() {
    let Some(conn) = connection().await else { return };
    let cache = RedisSessionCache::new(conn);
    let session = token();

    assert!(cache.get(&session).await.unwrap().is_none());

    cache
        .set(&session, "user-42", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(
        cache.get(&session).await.unwrap().as_deref(),
        Some("user-42")
    );

    cache.invalidate(&session).await.unwrap();
    assert!(cache.get(&session).await.unwrap().is_none());
    // Invalidating a missing entry is not an error.
    cache.invalidate(&session).await.unwrap();
}

#[tokio::test]
async fn session_cache_entries_expire() {
    let Some(conn) = connection().await else { return };
    let cache = RedisSessionCache::new(conn);
    let session = token();

    cache
        .set(&session, "user-42", Duration::from_millis(500))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(cache.get(&session).await.unwrap().is_none());
}
