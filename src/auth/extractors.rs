//! Axum extractors for authentication.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::jwt::CredentialPair;

use super::cookie::CookieTransport;
use super::errors::ApiAuthError;
use super::resolver::resolve_session;
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

tokio::task_local! {
    /// Task-local storage for a credential pair minted during the request.
    /// Used to pass the pair from the auth extractor to the response middleware.
    pub static REFRESHED_CREDENTIALS: RefCell<Option<CredentialPair>>;
}

/// Middleware that writes credentials renewed by an extractor onto the response.
pub async fn attach_refreshed_credentials(
    State(transport): State<CookieTransport>,
    request: Request,
    next: Next,
) -> Response {
    REFRESHED_CREDENTIALS
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;
            if let Some(pair) = REFRESHED_CREDENTIALS.with(|cell| cell.borrow_mut().take()) {
                transport.attach(response.headers_mut(), &pair);
            }
            response
        })
        .await
}

/// Core logic shared by the extractors. Reuses a session the route guard
/// already resolved for this request.
async fn authenticate_request<S>(
    parts: &mut Parts,
    state: &S,
) -> Result<AuthenticatedUser, ApiAuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
        return Ok(user.clone());
    }

    let resolved = resolve_session(&parts.headers, state)
        .await
        .map_err(|e| ApiAuthError::new(e, state.transport().clone()))?;

    if let Some(pair) = resolved.refreshed {
        let stored = REFRESHED_CREDENTIALS.try_with(|cell| {
            cell.borrow_mut().replace(pair);
        });
        if stored.is_err() {
            warn!("Session renewed outside the credential middleware, cookies not sent");
        }
    }

    parts.extensions.insert(resolved.user.clone());
    Ok(resolved.user)
}

/// Extractor for API endpoints that require authentication.
/// If the access credential is expired, renews from the refresh cookie.
/// Returns JSON errors instead of redirects.
pub struct ApiAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state).await.map(ApiAuth)
    }
}

/// Optional authentication extractor - never fails, returns Option<AuthenticatedUser>.
pub struct MaybeAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(authenticate_request(parts, state).await.ok()))
    }
}
