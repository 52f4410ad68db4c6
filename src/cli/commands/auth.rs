//! Token, abuse-protection and identity provider arguments.

use crate::auth::{AuthConfig, RateLimitConfig};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_EXPIRY: &str = "jwt-expiry";
pub const MAX_JWT_EXPIRY_MINUTES: i64 = 525_600;
pub const ARG_RATE_LIMIT: &str = "rate-limit";
pub const ARG_RATE_LIMIT_WINDOW: &str = "rate-limit-window";
pub const ARG_RATE_LIMIT_MAX_KEYS: &str = "rate-limit-max-keys";
pub const ARG_REQUEST_TIMEOUT: &str = "request-timeout";
pub const ARG_IDENTITY_URL: &str = "identity-url";

/// Fallback signing secret; running with it is allowed but logged as a warning.
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub jwt_expiry_minutes: i64,
    pub rate_limit: usize,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_keys: usize,
    pub request_timeout_seconds: u64,
    pub identity_url: Option<String>,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let to_usize = |value: u64| usize::try_from(value).unwrap_or(usize::MAX);

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            jwt_expiry_minutes: matches.get_one::<i64>(ARG_JWT_EXPIRY).copied().unwrap_or(15),
            rate_limit: to_usize(
                matches
                    .get_one::<u64>(ARG_RATE_LIMIT)
                    .copied()
                    .unwrap_or(60),
            ),
            rate_limit_window_seconds: matches
                .get_one::<u64>(ARG_RATE_LIMIT_WINDOW)
                .copied()
                .unwrap_or(60),
            rate_limit_max_keys: to_usize(
                matches
                    .get_one::<u64>(ARG_RATE_LIMIT_MAX_KEYS)
                    .copied()
                    .unwrap_or(100_000),
            ),
            request_timeout_seconds: matches
                .get_one::<u64>(ARG_REQUEST_TIMEOUT)
                .copied()
                .unwrap_or(10),
            identity_url: matches
                .get_one::<String>(ARG_IDENTITY_URL)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_access_ttl_seconds(self.jwt_expiry_minutes.saturating_mul(60))
            .with_request_timeout(Duration::from_secs(self.request_timeout_seconds))
            .with_rate_limit(RateLimitConfig {
                limit: self.rate_limit,
                window: Duration::from_secs(self.rate_limit_window_seconds),
                max_keys: self.rate_limit_max_keys,
            })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 signing secret shared by access and refresh tokens")
                .env("JWT_SECRET")
                .default_value(DEFAULT_JWT_SECRET)
                .hide_env_values(true)
                .hide_default_value(true),
        )
        .arg(
            Arg::new(ARG_JWT_EXPIRY)
                .long(ARG_JWT_EXPIRY)
                .help("Access token lifetime in minutes, at most one year")
                .env("JWT_EXPIRY")
                .default_value("15")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_JWT_EXPIRY_MINUTES)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT)
                .long(ARG_RATE_LIMIT)
                .help("Requests admitted per client within the rate limit window")
                .env("RATE_LIMIT")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW)
                .long(ARG_RATE_LIMIT_WINDOW)
                .help("Rate limit window in seconds")
                .env("RATE_LIMIT_WINDOW")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_KEYS)
                .long(ARG_RATE_LIMIT_MAX_KEYS)
                .help("Maximum number of clients tracked by the rate limiter")
                .env("RATE_LIMIT_MAX_KEYS")
                .default_value("100000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT)
                .long(ARG_REQUEST_TIMEOUT)
                .help("Budget in seconds for the dependency calls of one request")
                .env("REQUEST_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_IDENTITY_URL)
                .long(ARG_IDENTITY_URL)
                .help("Identity provider base URL, credentials are posted to <url>/verify")
                .long_help(
                    "Identity provider base URL, credentials are posted to <url>/verify. When unset every non-empty credential is accepted, do not run without it in production.",
                )
                .env("IDENTITY_URL"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_converts_units() {
        let options = Options {
            jwt_secret: SecretString::from("s3cret"),
            jwt_expiry_minutes: 30,
            rate_limit: 5,
            rate_limit_window_seconds: 10,
            rate_limit_max_keys: 42,
            request_timeout_seconds: 3,
            identity_url: None,
        };

        let config = options.auth_config();
        assert_eq!(config.access_ttl_seconds(), 1800);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(
            config.rate_limit(),
            RateLimitConfig {
                limit: 5,
                window: Duration::from_secs(10),
                max_keys: 42,
            }
        );
    }
}
