//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use super::cookie::CookieTransport;
use super::resolver::SessionError;

/// API authentication errors (returns JSON and clears cookies).
#[derive(Debug)]
pub struct ApiAuthError {
    kind: SessionError,
    transport: CookieTransport,
}

impl ApiAuthError {
    pub fn new(kind: SessionError, transport: CookieTransport) -> Self {
        Self { kind, transport }
    }

    fn status_code(&self) -> StatusCode {
        if self.kind.is_internal() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::UNAUTHORIZED
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            SessionError::AuthenticationRequired { .. } => "Authentication required",
            SessionError::SessionExpired => "Session expired, please log in again",
            SessionError::SubjectNotFound => "User not found",
            SessionError::Store(_) | SessionError::Issue(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        // A store outage says nothing about the credentials, keep them.
        if status == StatusCode::UNAUTHORIZED {
            self.transport.clear(response.headers_mut());
        }

        response
    }
}

/// Page guard failure - redirects to login without clearing cookies.
#[derive(Debug)]
pub struct GuardRedirect {
    pub login_path: String,
}

impl IntoResponse for GuardRedirect {
    fn into_response(self) -> Response {
        Redirect::temporary(&self.login_path).into_response()
    }
}
