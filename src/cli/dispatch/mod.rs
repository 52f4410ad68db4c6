//! Maps validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, stores, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8082);

    let stores_opts = stores::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: stores_opts.dsn()?,
        redis_url: stores_opts.redis_url(),
        auth_config: auth_opts.auth_config(),
        jwt_secret: auth_opts.jwt_secret,
        identity_url: auth_opts.identity_url,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;
    use std::time::Duration;

    #[test]
    fn env_builds_server_action() {
        temp_env::with_vars(
            [
                ("SERVER_PORT", Some("9090")),
                ("DB_HOST", Some("postgres")),
                ("DB_PORT", Some("5432")),
                ("DB_USER", Some("auth")),
                ("DB_PASSWORD", Some("pw")),
                ("DB_NAME", Some("authgate")),
                ("REDIS_ADDR", Some("redis:6379")),
                ("JWT_SECRET", Some("s3cret")),
                ("JWT_EXPIRY", Some("20")),
                ("REQUEST_TIMEOUT", Some("4")),
                ("IDENTITY_URL", Some("")),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["authgate"]);
                let Action::Server(args) = handler(&matches).unwrap();

                assert_eq!(args.port, 9090);
                assert_eq!(
                    args.dsn.expose_secret(),
                    "postgres://auth:pw@postgres:5432/authgate"
                );
                assert_eq!(args.redis_url, "redis://redis:6379");
                assert_eq!(args.jwt_secret.expose_secret(), "s3cret");
                assert_eq!(args.auth_config.access_ttl_seconds(), 1200);
                assert_eq!(args.auth_config.request_timeout(), Duration::from_secs(4));
                // Blank means unset.
                assert!(args.identity_url.is_none());
            },
        );
    }

    #[test]
    fn blank_jwt_secret_is_rejected() {
        temp_env::with_vars([("JWT_SECRET", Some("  "))], || {
            let matches = commands::new().get_matches_from(vec!["authgate"]);
            assert!(handler(&matches).is_err());
        });
    }
}
