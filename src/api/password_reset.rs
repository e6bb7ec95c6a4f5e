//! Password reset request and confirmation.
//!
//! A request mints a short-lived reset credential, records its token id and
//! hands the link to a [`ResetDelivery`]. Confirmation verifies the credential
//! and redeems the record in the same transaction that stores the new digest,
//! so each link works at most once.

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{ApiError, ResultExt, validate_password};
use crate::auth::{CookieTransport, hash_password};
use crate::db::Database;
use crate::jwt::{JwtConfig, SubjectClaims, unix_now};
use crate::rate_limit::{RateLimitConfig, rate_limit_password_reset};

const REQUEST_ACCEPTED: &str = "If an account exists for that email, a reset link has been sent";
const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

/// Sends a password reset link to the account owner.
pub trait ResetDelivery: Send + Sync {
    fn deliver(&self, email: &str, link: &Url);
}

/// Default delivery: writes the link to the log.
#[derive(Debug, Default)]
pub struct LogResetDelivery;

impl ResetDelivery for LogResetDelivery {
    fn deliver(&self, email: &str, link: &Url) {
        info!(email, link = %link, "Password reset link issued");
    }
}

#[derive(Clone)]
pub struct PasswordResetState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub transport: CookieTransport,
    pub public_origin: Url,
    pub delivery: Arc<dyn ResetDelivery>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

pub fn router(state: PasswordResetState) -> Router {
    Router::new()
        .route("/password-reset", post(request_reset))
        .route("/password-reset/confirm", post(confirm_reset))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config,
            rate_limit_password_reset,
        ))
}

#[derive(Deserialize)]
struct ResetRequest {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
struct ConfirmRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    password: String,
}

/// Always answers with the same message whether or not the account exists.
async fn request_reset(
    State(state): State<PasswordResetState>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }

    let accepted = Json(json!({ "message": REQUEST_ACCEPTED }));

    let Some(user) = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to look up user")?
    else {
        debug!("Password reset requested for unknown email");
        return Ok(accepted);
    };

    let credential = state
        .jwt
        .issue_password_reset(&SubjectClaims {
            subject_id: user.id,
            email: user.email.clone(),
        })
        .internal_err("Failed to issue reset credential")?;

    let store = state.db.reset_tokens();
    store
        .invalidate_for_user(user.id)
        .await
        .db_err("Failed to invalidate reset records")?;
    store
        .create(
            credential.jti(),
            user.id,
            credential.issued_at(),
            credential.expires_at(),
        )
        .await
        .db_err("Failed to store reset record")?;

    let link = state
        .public_origin
        .join(&format!("reset-password/{}", credential.token()))
        .internal_err("Failed to build reset link")?;
    state.delivery.deliver(&user.email, &link);

    info!(user_id = user.id, "Password reset requested");
    Ok(accepted)
}

async fn confirm_reset(
    State(state): State<PasswordResetState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Response, ApiError> {
    if payload.token.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Token and password are required"));
    }
    validate_password(&payload.password)?;

    let claims = state
        .jwt
        .verify_password_reset(&payload.token)
        .map_err(|e| {
            debug!(error = %e, "Reset credential rejected");
            ApiError::bad_request(INVALID_RESET_TOKEN)
        })?;

    let password_hash = hash_password(payload.password)
        .await
        .internal_err("Failed to hash password")?;
    let now = unix_now().internal_err("Failed to read clock")?;

    let redeemed = state
        .db
        .reset_tokens()
        .redeem(&claims.jti, claims.subject.subject_id, &password_hash, now)
        .await
        .db_err("Failed to redeem reset record")?;
    if !redeemed {
        warn!(
            user_id = claims.subject.subject_id,
            "Reset credential already used or revoked"
        );
        return Err(ApiError::bad_request(INVALID_RESET_TOKEN));
    }

    info!(user_id = claims.subject.subject_id, "Password reset completed");

    // Existing sessions on this browser must log in with the new password.
    let mut response = Json(json!({ "message": "Password has been reset" })).into_response();
    state.transport.clear(response.headers_mut());
    Ok(response)
}

