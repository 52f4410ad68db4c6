use crate::{api, auth::AuthConfig, cli::commands::auth::DEFAULT_JWT_SECRET};
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt::Write;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub redis_url: String,
    pub auth_config: AuthConfig,
    pub jwt_secret: SecretString,
    pub identity_url: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a backing store is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    if args.jwt_secret.expose_secret() == DEFAULT_JWT_SECRET {
        warn!("JWT_SECRET is not set, tokens are signed with the built-in default secret");
    }

    api::new(
        args.port,
        args.dsn,
        args.redis_url,
        args.auth_config,
        args.jwt_secret,
        args.identity_url,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let rate_limit = args.auth_config.rate_limit();
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_url(args.dsn.expose_secret())),
        ("redis", redact_url(&args.redis_url)),
        (
            "access_ttl",
            format!("{}s", args.auth_config.access_ttl_seconds()),
        ),
        (
            "request_timeout",
            format!("{}s", args.auth_config.request_timeout().as_secs()),
        ),
        (
            "rate_limit",
            format!(
                "{} per {}s, max {} clients",
                rate_limit.limit,
                rate_limit.window.as_secs(),
                rate_limit.max_keys
            ),
        ),
        (
            "identity_url",
            args.identity_url
                .clone()
                .unwrap_or_else(|| "none (permissive)".to_string()),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ = write!(message, "\n  {key}:{padding} {value}");
    }
    info!("{message}");
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-url".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_url_hides_password_only() {
        assert_eq!(
            redact_url("postgres://auth:pw@db:5432/authgate"),
            "postgres://auth:REDACTED@db:5432/authgate"
        );
        assert_eq!(redact_url("redis://cache:6379"), "redis://cache:6379");
        assert_eq!(redact_url("not a url"), "invalid-url");
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit("unknown"), "unknown");
    }
}
