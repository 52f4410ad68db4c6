//! Credential verification collaborator.
//!
//! The service never stores passwords. It asks an identity provider whether
//! an email/password pair is valid and which user it belongs to.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use url::Url;

/// Result of a credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted { user_id: String },
    Rejected,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// # Errors
    /// Returns an error only when the provider cannot answer; wrong
    /// credentials are [`Verification::Rejected`].
    async fn verify(&self, email: &str, password: &str) -> Result<Verification>;
}

/// Accepts every non-empty credential pair and derives the user id from the
/// email. Stand-in used until an identity provider is configured.
#[derive(Debug, Clone, Default)]
pub struct PermissiveVerifier;

#[async_trait]
impl IdentityVerifier for PermissiveVerifier {
    async fn verify(&self, email: &str, password: &str) -> Result<Verification> {
        if email.is_empty() || password.is_empty() {
            return Ok(Verification::Rejected);
        }
        Ok(Verification::Accepted {
            user_id: format!("user-{email}"),
        })
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    user_id: String,
}

/// Calls `POST <base>/verify` on an identity provider.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    client: Client,
    verify_url: Url,
}

impl HttpIdentityVerifier {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid identity URL: {base_url}"))?;
        let verify_url = base
            .join(&format!("{}/verify", base.path().trim_end_matches('/')))
            .context("failed to build identity verify URL")?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build identity HTTP client")?;
        Ok(Self { client, verify_url })
    }

    #[must_use]
    pub fn verify_url(&self) -> &str {
        self.verify_url.as_str()
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    #[instrument(skip(self, password))]
    async fn verify(&self, email: &str, password: &str) -> Result<Verification> {
        let response = self
            .client
            .post(self.verify_url.clone())
            .json(&VerifyRequest { email, password })
            .send()
            .await
            .context("identity provider unreachable")?;

        match response.status() {
            StatusCode::OK => {
                let body: VerifyResponse = response
                    .json()
                    .await
                    .context("invalid identity provider response")?;
                if body.user_id.is_empty() {
                    return Err(anyhow!("identity provider returned an empty user id"));
                }
                Ok(Verification::Accepted {
                    user_id: body.user_id,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Ok(Verification::Rejected)
            }
            status => {
                warn!("identity provider returned {status}");
                Err(anyhow!("identity provider returned {status}"))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permissive_verifier_derives_user_id() {
        let verifier = PermissiveVerifier;
        assert_eq!(
            verifier.verify("a@b.com", "x").await.unwrap(),
            Verification::Accepted {
                user_id: "user-a@b.com".to_string()
            }
        );
        assert_eq!(
            verifier.verify("a@b.com", "").await.unwrap(),
            Verification::Rejected
        );
    }

    #[test]
    fn verify_url_keeps_base_path() {
        let verifier = HttpIdentityVerifier::new("https://accounts.internal/api/v1/").unwrap();
        assert_eq!(
            verifier.verify_url(),
            "https://accounts.internal/api/v1/verify"
        );
        let verifier = HttpIdentityVerifier::new("http://accounts:8081").unwrap();
        assert_eq!(verifier.verify_url(), "http://accounts:8081/verify");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpIdentityVerifier::new("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let verifier = HttpIdentityVerifier::new("http://127.0.0.1:9").unwrap();
        assert!(verifier.verify("a@b.com", "x").await.is_err());
    }
}
