use crate::auth::{
    AuthConfig, AuthState, BlacklistRegistry, HttpIdentityVerifier, IdentityVerifier,
    PermissiveVerifier, PgLoginAttemptTracker, PgSessionRepository, RedisBlacklist,
    RedisSessionCache, SessionStore,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use redis::aio::ConnectionManager;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::auth::{login, logout, refresh, session, validate};

/// Build the application router around `state`.
///
/// Every auth route is rate limited per client; protected routes also pass
/// the gatekeeper, which runs after the limiter.
pub fn router(state: Arc<AuthState>) -> Router {
    let protected = Router::new()
        .route("/logout", post(logout::logout))
        .route("/logout/all", post(logout::logout_all))
        .route("/session", get(session::current_session))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::auth::require_identity,
        ));

    let limited = Router::new()
        .route("/login", post(login::login))
        .route("/refresh", post(refresh::refresh))
        .route("/validate", post(validate::validate))
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::auth::limit_by_client,
        ));

    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/readyz", get(handlers::ready))
        .merge(limited)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if a backing store is unreachable, the configuration is
/// invalid, or the listener cannot be bound
pub async fn new(
    port: u16,
    dsn: SecretString,
    redis_url: String,
    auth_config: AuthConfig,
    jwt_secret: SecretString,
    identity_url: Option<String>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(5)
        .max_connections(25)
        .max_lifetime(Duration::from_secs(60 * 5))
        .acquire_timeout(auth_config.request_timeout())
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    info!("Connected to PostgreSQL");

    // Connect to Redis, the ping makes an unreachable server fatal at startup
    let client = redis::Client::open(redis_url.as_str()).context("Invalid Redis address")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    let blacklist = RedisBlacklist::new(conn.clone());
    blacklist.ping().await.context("Failed to ping Redis")?;

    info!("Connected to Redis");

    let identity: Arc<dyn IdentityVerifier> = if let Some(url) = identity_url {
        info!("Verifying credentials against {url}");
        Arc::new(HttpIdentityVerifier::new(&url)?)
    } else {
        warn!("No identity provider configured, every non-empty credential is accepted");
        Arc::new(PermissiveVerifier)
    };

    let sessions = SessionStore::new(
        Arc::new(PgSessionRepository::new(pool.clone())),
        Arc::new(RedisSessionCache::new(conn)),
    );

    let state = Arc::new(AuthState::new(
        auth_config,
        &jwt_secret,
        sessions,
        Arc::new(blacklist),
        Arc::new(PgLoginAttemptTracker::new(pool)),
        identity,
    )?);

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
