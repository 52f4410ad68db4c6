//! Sliding-window request limiter keyed by client.
//!
//! Each key keeps the timestamps of its admitted requests inside the window.
//! A check prunes stale timestamps, admits the request if fewer than `limit`
//! remain, and records it, all under one lock so two concurrent requests can
//! never both take the last slot.
//!
//! Memory is bounded two ways: keys whose timestamps have all aged out are
//! swept at most once per window, and when `max_keys` is reached the key seen
//! least recently is evicted to make room.
//!
//! The limiter is process-local. Replicas each enforce their own window.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, error};

pub const DEFAULT_LIMIT: usize = 60;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_KEYS: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: usize,
    pub window: Duration,
    pub max_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    /// Rejected; the oldest slot frees up after `retry_after`.
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
struct Windows {
    requests: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows {
                requests: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check and record a request for `key` at the current instant.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let Ok(mut windows) = self.windows.lock() else {
            // Fail closed: a poisoned map must not turn into unlimited traffic.
            error!("rate limiter lock poisoned");
            return RateLimitDecision::Limited {
                retry_after: self.config.window,
            };
        };

        let window = self.config.window;
        if now.saturating_duration_since(windows.last_sweep) >= window {
            sweep(&mut windows.requests, now, window);
            windows.last_sweep = now;
        }

        if !windows.requests.contains_key(key) && windows.requests.len() >= self.config.max_keys {
            sweep(&mut windows.requests, now, window);
            if windows.requests.len() >= self.config.max_keys {
                evict_least_recent(&mut windows.requests);
            }
        }

        let timestamps = windows.requests.entry(key.to_string()).or_default();
        prune(timestamps, now, window);

        if timestamps.len() >= self.config.limit {
            let retry_after = timestamps
                .front()
                .map_or(window, |oldest| {
                    window.saturating_sub(now.saturating_duration_since(*oldest))
                });
            debug!(key, retry_after = ?retry_after, "rate limit exceeded");
            return RateLimitDecision::Limited { retry_after };
        }

        timestamps.push_back(now);
        RateLimitDecision::Allowed
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .map(|windows| windows.requests.len())
            .unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

fn sweep(requests: &mut HashMap<String, VecDeque<Instant>>, now: Instant, window: Duration) {
    requests.retain(|_, timestamps| {
        prune(timestamps, now, window);
        !timestamps.is_empty()
    });
}

fn evict_least_recent(requests: &mut HashMap<String, VecDeque<Instant>>) {
    let victim = requests
        .iter()
        .min_by_key(|(_, timestamps)| timestamps.back().copied())
        .map(|(key, _)| key.clone());
    if let Some(key) = victim {
        requests.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(limit: usize, window: Duration, max_keys: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            limit,
            window,
            max_keys,
        })
    }

    #[tokio::test]
    async fn admits_limit_then_rejects_until_window_passes() {
        let limiter = limiter(3, Duration::from_secs(1), 16);

        for _ in 0..3 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow("10.0.0.1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60), 16);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_allowed());
        assert!(!limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("b", now).is_allowed());
    }

    #[test]
    fn window_slides_instead_of_resetting() {
        let limiter = limiter(2, Duration::from_secs(10), 16);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_allowed());
        assert!(limiter
            .check_at("k", start + Duration::from_secs(6))
            .is_allowed());
        // First request still inside the window.
        assert!(!limiter
            .check_at("k", start + Duration::from_secs(9))
            .is_allowed());
        // First request aged out, second still counts.
        assert!(limiter
            .check_at("k", start + Duration::from_secs(10))
            .is_allowed());
        assert!(!limiter
            .check_at("k", start + Duration::from_secs(11))
            .is_allowed());
    }

    #[test]
    fn retry_after_points_at_oldest_slot() {
        let limiter = limiter(1, Duration::from_secs(10), 16);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_allowed());
        assert_eq!(
            limiter.check_at("k", start + Duration::from_secs(4)),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(6)
            }
        );
    }

    #[test]
    fn idle_keys_are_swept() {
        let limiter = limiter(5, Duration::from_secs(1), 1_000);
        let start = Instant::now();
        for i in 0..50 {
            limiter.check_at(&format!("client-{i}"), start);
        }
        assert_eq!(limiter.tracked_keys(), 50);

        limiter.check_at("late", start + Duration::from_secs(2));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn key_count_never_exceeds_cap() {
        let limiter = limiter(1, Duration::from_secs(60), 3);
        let start = Instant::now();
        for i in 0..10u64 {
            limiter.check_at(&format!("client-{i}"), start + Duration::from_millis(i));
            assert!(limiter.tracked_keys() <= 3);
        }
        // Recent keys are still tracked and therefore still limited.
        assert!(!limiter
            .check_at("client-9", start + Duration::from_millis(20))
            .is_allowed());
        // The least recently seen key was evicted and starts over.
        assert!(limiter
            .check_at("client-0", start + Duration::from_millis(21))
            .is_allowed());
        assert_eq!(limiter.tracked_keys(), 3);
    }

    #[test]
    fn concurrent_callers_never_double_admit() {
        let limiter = Arc::new(limiter(10, Duration::from_secs(60), 16));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..10).filter(|_| limiter.allow("shared")).count())
            })
            .collect();
        let admitted: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .sum();
        assert_eq!(admitted, 10);
    }
}
