//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde_json::json;
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, warn};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key shared by requests whose client address cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

pub const LOGIN_PER_MINUTE: NonZeroU32 = NonZeroU32::new(10).unwrap();
pub const REGISTER_PER_MINUTE: NonZeroU32 = NonZeroU32::new(3).unwrap();
pub const PASSWORD_RESET_PER_MINUTE: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Requests per minute allowed for each limited endpoint group.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub login_per_minute: NonZeroU32,
    pub register_per_minute: NonZeroU32,
    pub password_reset_per_minute: NonZeroU32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login_per_minute: LOGIN_PER_MINUTE,
            register_per_minute: REGISTER_PER_MINUTE,
            password_reset_per_minute: PASSWORD_RESET_PER_MINUTE,
        }
    }
}

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for password login
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for registration
    pub register: Arc<IpLimiter>,
    /// Per-IP limiter for password reset requests and confirmations
    pub password_reset: Arc<IpLimiter>,
    /// Header carrying the client IP when running behind a proxy
    pub ip_header: Option<HeaderName>,
}

impl RateLimitConfig {
    pub fn new(limits: RateLimits, ip_header: Option<HeaderName>) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(limits.login_per_minute))),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(
                limits.register_per_minute,
            ))),
            password_reset: Arc::new(RateLimiter::keyed(Quota::per_minute(
                limits.password_reset_per_minute,
            ))),
            ip_header,
        }
    }

    fn client_key(&self, request: &Request) -> String {
        match extract_client_ip(request, self.ip_header.as_ref()) {
            Ok(ip) => ip.to_string(),
            Err(reason) => {
                debug!(reason, "Client IP unavailable, using shared rate limit bucket");
                UNKNOWN_CLIENT.to_string()
            }
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(RateLimits::default(), None)
    }
}

async fn check(
    limiter: &IpLimiter,
    key: String,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message }))).into_response()
        }
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);
    check(
        &config.login,
        key,
        "Too many login attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);
    check(
        &config.register,
        key,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting password reset.
pub async fn rate_limit_password_reset(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);
    check(
        &config.password_reset,
        key,
        "Too many password reset attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}
