//! Minimal HTML pages.
//!
//! The public pages host the login, registration and reset forms. The record
//! sections only identify the caller; their paths are what the route guard
//! protects.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Request},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};

use crate::auth::{AuthenticatedUser, CookieTransport, MaybeAuth, attach_refreshed_credentials};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

/// Login entry point; unauthenticated page loads are sent here.
pub const LOGIN_PATH: &str = "/login";

/// Landing page after login.
pub const HOME_PATH: &str = "/dashboard";

/// Record sections served behind the guard.
const SECTIONS: &[(&str, &str)] = &[
    ("/dashboard", "Dashboard"),
    ("/clients", "Clients"),
    ("/invoices", "Invoices"),
    ("/orders", "Purchase orders"),
];

#[derive(Clone)]
pub struct PagesState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub transport: CookieTransport,
}

impl_has_auth_backend!(PagesState);

pub fn router(state: PagesState) -> Router {
    let mut router = Router::new()
        .route("/", get(|| async { Redirect::temporary(HOME_PATH) }))
        .route(LOGIN_PATH, get(login_page))
        .route("/register", get(register_page))
        .route("/reset-password/{token}", get(reset_password_page));

    for &(path, title) in SECTIONS {
        router = router
            .route(path, get(move |request: Request| section_page(title, request)))
            // `{*rest}` needs a non-empty segment, the guard also covers `path/`.
            .route(
                &format!("{}/", path),
                get(move |request: Request| section_page(title, request)),
            )
            .route(
                &format!("{}/{{*rest}}", path),
                get(move |request: Request| section_page(title, request)),
            );
    }

    router
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.transport,
            attach_refreshed_credentials,
        ))
}

/// Already signed-in visitors go straight to the dashboard.
async fn login_page(MaybeAuth(auth): MaybeAuth) -> Response {
    if auth.is_some() {
        return Redirect::temporary(HOME_PATH).into_response();
    }
    page(
        "Log in",
        r#"<form id="login" method="post" action="/api/auth/login">
<input name="email" type="email" required>
<input name="password" type="password" required>
<button type="submit">Log in</button>
</form>
<p><a href="/register">Create an account</a></p>"#,
    )
    .into_response()
}

async fn register_page() -> Html<String> {
    page(
        "Register",
        r#"<form id="register" method="post" action="/api/auth/register">
<input name="name" required>
<input name="email" type="email" required>
<input name="password" type="password" minlength="8" required>
<button type="submit">Register</button>
</form>
<p><a href="/login">Already registered?</a></p>"#,
    )
}

async fn reset_password_page(Path(token): Path<String>) -> Html<String> {
    page(
        "Reset password",
        &format!(
            r#"<form id="reset" method="post" action="/api/auth/password-reset/confirm">
<input name="token" type="hidden" value="{}">
<input name="password" type="password" minlength="8" required>
<button type="submit">Set new password</button>
</form>"#,
            escape_html(&token)
        ),
    )
}

/// The guard stores the resolved user in the request extensions.
async fn section_page(title: &'static str, request: Request) -> Response {
    let Some(auth) = request.extensions().get::<AuthenticatedUser>() else {
        return Redirect::temporary(LOGIN_PATH).into_response();
    };
    page(
        title,
        &format!(
            r#"<p id="user">Signed in as {} &lt;{}&gt;</p>"#,
            escape_html(&auth.user.name),
            escape_html(&auth.user.email)
        ),
    )
    .into_response()
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{}\n</body></html>\n",
        title, title, body
    ))
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
