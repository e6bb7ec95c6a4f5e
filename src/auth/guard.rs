//! Route guard for protected page paths.
//!
//! Runs in front of the router. Requests under a protected prefix must resolve
//! to a session, otherwise they are redirected to the login page. On success
//! the user is stored in the request extensions and any renewed credentials
//! are written onto the response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::db::Database;
use crate::jwt::JwtConfig;

use super::cookie::CookieTransport;
use super::errors::GuardRedirect;
use super::resolver::resolve_session;

/// Path prefixes guarded when none are configured.
pub const DEFAULT_PROTECTED_PREFIXES: &[&str] = &["/dashboard", "/clients", "/invoices", "/orders"];

/// Which paths require a session and where to send callers without one.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    prefixes: Vec<String>,
    login_path: String,
}

impl GuardPolicy {
    pub fn new<I, P>(prefixes: I, login_path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| {
                let p: String = p.into();
                let trimmed = p.trim_end_matches('/');
                if trimmed.is_empty() {
                    "/".to_string()
                } else {
                    trimmed.to_string()
                }
            })
            .collect();
        Self {
            prefixes,
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Segment-aware prefix match: `/orders` covers `/orders` and
    /// `/orders/42` but not `/ordersfoo`. The login page is never guarded.
    pub fn is_protected(&self, path: &str) -> bool {
        if path == self.login_path {
            return false;
        }
        self.prefixes.iter().any(|prefix| {
            prefix == "/"
                || path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

#[derive(Clone)]
pub struct GuardState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub transport: CookieTransport,
    pub policy: Arc<GuardPolicy>,
}

crate::impl_has_auth_backend!(GuardState);

/// Middleware enforcing the guard policy.
pub async fn route_guard(
    State(state): State<GuardState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !state.policy.is_protected(&path) {
        return next.run(request).await;
    }

    match resolve_session(request.headers(), &state).await {
        Ok(resolved) => {
            request.extensions_mut().insert(resolved.user);
            let mut response = next.run(request).await;
            if let Some(pair) = resolved.refreshed {
                state.transport.attach(response.headers_mut(), &pair);
            }
            response
        }
        Err(e) => {
            if e.is_internal() {
                error!(path = %path, error = %e, "Session resolution failed");
            } else {
                debug!(path = %path, error = %e, "Redirecting unauthenticated request");
            }
            GuardRedirect {
                login_path: state.policy.login_path().to_string(),
            }
            .into_response()
        }
    }
}
