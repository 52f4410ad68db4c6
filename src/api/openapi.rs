use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::{
    error::ErrorResponse,
    handlers::{
        auth::{login, logout, refresh, session, types, validate},
        health,
    },
};
use crate::auth::TokenPair;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::ready,
        login::login,
        logout::logout,
        logout::logout_all,
        refresh::refresh,
        validate::validate,
        session::current_session,
    ),
    components(schemas(
        ErrorResponse,
        TokenPair,
        health::Health,
        health::Readiness,
        types::LoginRequest,
        types::RefreshRequest,
        types::ValidateRequest,
        types::ValidateResponse,
        types::MessageResponse,
        types::LogoutAllResponse,
        types::SessionResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Token issuance, rotation, validation and revocation"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = openapi();
        for path in [
            "/healthz",
            "/readyz",
            "/login",
            "/logout",
            "/logout/all",
            "/refresh",
            "/validate",
            "/session",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = openapi();
        let components = doc.components.as_ref();
        assert!(components.is_some_and(|c| c.security_schemes.contains_key("bearer")));
    }
}
