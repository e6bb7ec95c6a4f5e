pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod pages;
pub mod rate_limit;

use api::{ResetDelivery, create_api_router};
use auth::{
    CookieTransport, GuardPolicy, GuardState, SameSite, attach_refreshed_credentials, route_guard,
};
use axum::{Router, http::HeaderName, middleware};
use db::Database;
use jwt::JwtConfig;
use pages::{LOGIN_PATH, PagesState};
use rate_limit::{RateLimitConfig, RateLimits};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens (and password reset links)
    pub jwt_secret: Vec<u8>,
    /// Secret for signing refresh tokens, must differ from `jwt_secret`
    pub jwt_refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Origin used to build links sent outside the app
    pub public_origin: Url,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    pub same_site: SameSite,
    /// Page path prefixes that require a session
    pub protected_prefixes: Vec<String>,
    pub rate_limits: RateLimits,
    /// Header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
    /// Where password reset links go
    pub reset_delivery: Arc<dyn ResetDelivery>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(
        JwtConfig::new(&config.jwt_secret, &config.jwt_refresh_secret)
            .with_ttls(config.access_ttl, config.refresh_ttl),
    );
    let transport = CookieTransport::new(config.secure_cookies, config.same_site);
    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.ip_header.clone(),
    ));

    let api_router = create_api_router(
        config.db.clone(),
        jwt.clone(),
        transport.clone(),
        rate_limit_config,
        config.public_origin.clone(),
        config.reset_delivery.clone(),
    )
    .layer(middleware::from_fn_with_state(
        transport.clone(),
        attach_refreshed_credentials,
    ));

    let pages_router = pages::router(PagesState {
        db: config.db.clone(),
        jwt: jwt.clone(),
        transport: transport.clone(),
    });

    let guard_state = GuardState {
        db: config.db.clone(),
        jwt,
        transport,
        policy: Arc::new(GuardPolicy::new(
            config.protected_prefixes.iter().cloned(),
            LOGIN_PATH,
        )),
    };

    Router::new()
        .nest("/api", api_router)
        .merge(pages_router)
        .layer(middleware::from_fn_with_state(guard_state, route_guard))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
