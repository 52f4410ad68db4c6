use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{auth::AuthState, GIT_COMMIT_HASH};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    status: String,
    name: String,
    version: String,
    commit: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Readiness {
    status: String,
    database: String,
    cache: String,
}

fn x_app_header() -> HeaderMap {
    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    };

    format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )
    .parse::<HeaderValue>()
    .map(|value| {
        let mut headers = HeaderMap::new();
        headers.insert("X-App", value);
        headers
    })
    .unwrap_or_else(|err| {
        error!("Failed to parse X-App header: {}", err);
        HeaderMap::new()
    })
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Process is up", body = Health),
    ),
    tag = "health"
)]
// axum handler for liveness
pub async fn health() -> impl IntoResponse {
    let health = Health {
        status: "ok".to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: GIT_COMMIT_HASH.to_string(),
    };

    (x_app_header(), Json(health))
}

#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Database and cache reachable", body = Readiness),
        (status = 503, description = "Database or cache unreachable", body = Readiness),
    ),
    tag = "health"
)]
// axum handler for readiness
pub async fn ready(Extension(state): Extension<Arc<AuthState>>) -> impl IntoResponse {
    let deadline = state.deadline();

    let database = deadline
        .best_effort("database.ping", state.sessions().ping())
        .await
        .is_some();
    let cache = deadline
        .best_effort("cache.ping", state.blacklist().ping())
        .await
        .is_some();

    let label = |ok: bool| (if ok { "ok" } else { "error" }).to_string();
    let readiness = Readiness {
        status: label(database && cache),
        database: label(database),
        cache: label(cache),
    };
    debug!(?readiness, "readiness probe");

    let status = if database && cache {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, x_app_header(), Json(readiness))
}
