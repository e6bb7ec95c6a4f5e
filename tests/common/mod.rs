//! Shared helpers for the router-level integration tests.

#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use invoicer::{
    ServerConfig,
    api::ResetDelivery,
    auth::{DEFAULT_PROTECTED_PREFIXES, SameSite},
    create_app,
    db::Database,
    jwt::{ACCESS_TOKEN_DURATION_SECS, JwtConfig, REFRESH_TOKEN_DURATION_SECS},
    rate_limit::RateLimits,
};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-at-least-32-bytes";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-at-least-32-bytes";
pub const PASSWORD: &str = "correct-horse-battery";
pub const ORIGIN: &str = "http://localhost:3000";

/// Records reset links instead of sending them.
#[derive(Default)]
pub struct CapturingDelivery {
    sent: Mutex<Vec<(String, Url)>>,
}

impl ResetDelivery for CapturingDelivery {
    fn deliver(&self, email: &str, link: &Url) {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), link.clone()));
    }
}

impl CapturingDelivery {
    pub fn sent(&self) -> Vec<(String, Url)> {
        self.sent.lock().unwrap().clone()
    }

    /// The reset token from the most recent link.
    pub fn last_token(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, link)| link.path().strip_prefix("/reset-password/").map(String::from))
    }
}

pub struct TestOptions {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub secure_cookies: bool,
    pub same_site: SameSite,
    pub protected_prefixes: Vec<String>,
    pub rate_limits: RateLimits,
}

impl Default for TestOptions {
    fn default() -> Self {
        let generous = NonZeroU32::new(10_000).unwrap();
        Self {
            access_ttl: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            refresh_ttl: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
            secure_cookies: false,
            same_site: SameSite::Strict,
            protected_prefixes: DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            rate_limits: RateLimits {
                login_per_minute: generous,
                register_per_minute: generous,
                password_reset_per_minute: generous,
            },
        }
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    /// Same keys and lifetimes as the app, for minting and checking credentials.
    pub jwt: JwtConfig,
    pub deliveries: Arc<CapturingDelivery>,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(TestOptions::default()).await
}

pub async fn create_test_app_with(options: TestOptions) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let deliveries = Arc::new(CapturingDelivery::default());
    let jwt = JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET)
        .with_ttls(options.access_ttl, options.refresh_ttl);

    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: ACCESS_SECRET.to_vec(),
        jwt_refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl: options.access_ttl,
        refresh_ttl: options.refresh_ttl,
        public_origin: Url::parse(ORIGIN).expect("Invalid URL"),
        secure_cookies: options.secure_cookies,
        same_site: options.same_site,
        protected_prefixes: options.protected_prefixes,
        rate_limits: options.rate_limits,
        ip_header: None,
        reset_delivery: deliveries.clone(),
    };

    TestApp {
        app: create_app(&config),
        db,
        jwt,
        deliveries,
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie being set (not cleared)
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=;", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

/// Cookie request header carrying the session cookies found in `cookies`.
pub fn session_cookie(cookies: &[String]) -> String {
    let access = cookie_value(cookies, "auth_token").expect("auth_token not set");
    let refresh = cookie_value(cookies, "refresh_token").expect("refresh_token not set");
    format!("auth_token={}; refresh_token={}", access, refresh)
}

/// Register a user through the API. Returns the response body and Set-Cookie values.
pub async fn register(app: &Router, name: &str, email: &str) -> (Value, Vec<String>) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201, "registration of {} failed", email);
    let cookies = extract_set_cookies(&response);
    (body_json(response).await, cookies)
}
