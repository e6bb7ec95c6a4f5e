//! Tests for the page route guard.

mod common;

use std::time::Duration;

use axum::http::{StatusCode, header};
use common::*;
use tower::ServiceExt;

fn location(response: &axum::http::Response<axum::body::Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_unauthenticated_page_redirects_to_login() {
    let t = create_test_app().await;

    for path in ["/dashboard", "/clients", "/invoices", "/orders", "/orders/42"] {
        let response = t.app.clone().oneshot(get(path, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{}", path);
        assert_eq!(location(&response), "/login");
        // Redirects never touch cookies.
        assert!(extract_set_cookies(&response).is_empty());
    }
}

#[tokio::test]
async fn test_invalid_cookies_redirect_without_clearing() {
    let t = create_test_app().await;

    let response = t
        .app
        .oneshot(get(
            "/invoices",
            Some("auth_token=garbage; refresh_token=garbage"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(extract_set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_prefix_match_is_segment_aware() {
    let t = create_test_app().await;

    let response = t.app.oneshot(get("/ordersfoo", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_authenticated_page_shows_user() {
    let t = create_test_app().await;
    let (_, cookies) = register(&t.app, "Alice <Admin>", "alice@example.com").await;

    let response = t
        .app
        .clone()
        .oneshot(get("/clients", Some(&session_cookie(&cookies))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());
    let html = body_text(response).await;
    assert!(html.contains("<title>Clients</title>"));
    assert!(html.contains("Alice &lt;Admin&gt;"));

    let response = t
        .app
        .oneshot(get("/orders/42/edit", Some(&session_cookie(&cookies))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_trailing_slash_section_is_served() {
    let t = create_test_app().await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;

    let response = t
        .app
        .clone()
        .oneshot(get("/dashboard/", Some(&session_cookie(&cookies))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("<title>Dashboard</title>"));

    let response = t.app.oneshot(get("/dashboard/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_guard_renews_expired_access() {
    let t = create_test_app_with(TestOptions {
        access_ttl: Duration::from_secs(1),
        ..TestOptions::default()
    })
    .await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;
    let old_access = cookie_value(&cookies, "auth_token").unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    let response = t
        .app
        .clone()
        .oneshot(get("/invoices", Some(&session_cookie(&cookies))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let renewed = extract_set_cookies(&response);
    assert_eq!(renewed.len(), 2);
    let new_access = cookie_value(&renewed, "auth_token").unwrap();
    assert_ne!(new_access, old_access);
    assert!(t.jwt.verify_access(&new_access).is_ok());
    assert!(body_text(response).await.contains("alice@example.com"));
}

#[tokio::test]
async fn test_guard_with_refresh_cookie_only() {
    let t = create_test_app().await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;
    let refresh = cookie_value(&cookies, "refresh_token").unwrap();

    let response = t
        .app
        .oneshot(get(
            "/dashboard",
            Some(&format!("refresh_token={}", refresh)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&extract_set_cookies(&response), "auth_token").is_some());
}

#[tokio::test]
async fn test_root_redirects_to_dashboard() {
    let t = create_test_app().await;

    let response = t.app.oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_public_pages() {
    let t = create_test_app().await;

    for (path, marker) in [
        ("/login", r#"id="login""#),
        ("/register", r#"id="register""#),
        ("/reset-password/abc", r#"value="abc""#),
    ] {
        let response = t.app.clone().oneshot(get(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert!(body_text(response).await.contains(marker), "{}", path);
    }
}

#[tokio::test]
async fn test_login_page_redirects_when_signed_in() {
    let t = create_test_app().await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;

    let response = t
        .app
        .oneshot(get("/login", Some(&session_cookie(&cookies))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_login_page_renewal_sets_cookies() {
    let t = create_test_app().await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;
    let refresh = cookie_value(&cookies, "refresh_token").unwrap();

    let response = t
        .app
        .oneshot(get("/login", Some(&format!("refresh_token={}", refresh))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(cookie_value(&extract_set_cookies(&response), "auth_token").is_some());
}

#[tokio::test]
async fn test_custom_protected_prefix() {
    let t = create_test_app_with(TestOptions {
        protected_prefixes: vec!["/reports/".to_string()],
        ..TestOptions::default()
    })
    .await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;

    let response = t
        .app
        .clone()
        .oneshot(get("/reports/2024", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/login");

    // Guarded but unrouted: passes the guard and falls through to 404.
    let response = t
        .app
        .oneshot(get("/reports", Some(&session_cookie(&cookies))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_is_not_redirected() {
    let t = create_test_app().await;

    let response = t.app.oneshot(get("/api/auth/me", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::LOCATION).is_none());
    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_store_outage_redirects() {
    let t = create_test_app().await;
    let (_, cookies) = register(&t.app, "Alice", "alice@example.com").await;
    t.db.pool().close().await;

    let response = t
        .app
        .oneshot(get("/dashboard", Some(&session_cookie(&cookies))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(extract_set_cookies(&response).is_empty());
}
