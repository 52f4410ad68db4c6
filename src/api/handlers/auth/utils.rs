//! Shared helpers for auth handlers and middleware.

use axum::{
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, HeaderMap},
};
use std::net::SocketAddr;

use crate::auth::AuthFailure;

/// Pull the token out of `Authorization: Bearer <token>`; the scheme is
/// matched case-insensitively.
pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthFailure> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthFailure::Missing)?;
    let value = value.to_str().map_err(|_| AuthFailure::Malformed)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(AuthFailure::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthFailure::Malformed);
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        Err(AuthFailure::Malformed)
    } else {
        Ok(token.to_string())
    }
}

/// Peer address of the connection, used as the rate-limit key and in the
/// login audit log.
pub(super) fn client_ip(connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extract_bearer_token_ignores_scheme_case() {
        assert_eq!(
            extract_bearer_token(&headers("Bearer abc.def.ghi")),
            Ok("abc.def.ghi".to_string())
        );
        assert_eq!(
            extract_bearer_token(&headers("bearer abc")),
            Ok("abc".to_string())
        );
        assert_eq!(
            extract_bearer_token(&headers("BEARER abc")),
            Ok("abc".to_string())
        );
        assert_eq!(
            extract_bearer_token(&headers("bEaReR abc")),
            Ok("abc".to_string())
        );
    }

    #[test]
    fn extract_bearer_token_reports_missing_and_malformed() {
        assert_eq!(
            extract_bearer_token(&HeaderMap::new()),
            Err(AuthFailure::Missing)
        );
        assert_eq!(
            extract_bearer_token(&headers("Basic dXNlcjpwYXNz")),
            Err(AuthFailure::Malformed)
        );
        assert_eq!(
            extract_bearer_token(&headers("Bearer ")),
            Err(AuthFailure::Malformed)
        );
        assert_eq!(
            extract_bearer_token(&headers("Bearerabc")),
            Err(AuthFailure::Malformed)
        );
        assert_eq!(
            extract_bearer_token(&headers("Bearer a b")),
            Err(AuthFailure::Malformed)
        );
    }

    #[test]
    fn client_ip_strips_port() {
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        assert_eq!(
            client_ip(Some(&ConnectInfo(addr))),
            Some("10.1.2.3".to_string())
        );
        assert_eq!(client_ip(None), None);
    }
}
