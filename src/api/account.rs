//! Account endpoints: registration, password login, logout, identity check,
//! profile and password changes, explicit refresh.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt, validate_email, validate_password};
use crate::auth::{
    ApiAuth, ApiAuthError, CookieTransport, hash_password, renew_session, verify_missing_account,
    verify_password,
};
use crate::db::{Database, NewUser, ProfileUpdate, UserProfile, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, SubjectClaims};
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

/// One message for every login failure, so callers cannot probe for accounts.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Clone)]
pub struct AccountState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub transport: CookieTransport,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AccountState);

pub fn router(state: AccountState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me).put(update_profile))
        .route("/password", put(change_password))
        .route("/refresh", post(refresh))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    company_name: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    registration_number: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    name: Option<String>,
    company_name: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    registration_number: Option<String>,
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    user: UserProfile,
    token: String,
}

#[derive(Serialize)]
struct UserResponse {
    user: UserProfile,
}

/// Mint a pair for `user` and build a response carrying it as cookies.
fn session_response(
    state: &AccountState,
    status: StatusCode,
    message: Option<&'static str>,
    user: UserProfile,
) -> Result<Response, ApiError> {
    let pair = state
        .jwt
        .issue(&SubjectClaims {
            subject_id: user.id,
            email: user.email.clone(),
        })
        .internal_err("Failed to issue credentials")?;

    let mut response = (
        status,
        Json(SessionResponse {
            message,
            user,
            token: pair.access.token().to_string(),
        }),
    )
        .into_response();
    state.transport.attach(response.headers_mut(), &pair);
    Ok(response)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn register(
    State(state): State<AccountState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let name = payload.name.trim();
    let email = payload.email.trim();
    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Name, email and password are required"));
    }
    validate_email(email)?;
    validate_password(&payload.password)?;

    if state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to check email")?
        .is_some()
    {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = hash_password(payload.password)
        .await
        .internal_err("Failed to hash password")?;

    let company_name = non_empty(payload.company_name);
    let address = non_empty(payload.address);
    let phone = non_empty(payload.phone);
    let registration_number = non_empty(payload.registration_number);

    let id = match state
        .db
        .users()
        .create(&NewUser {
            name,
            email,
            password_hash: &password_hash,
            company_name: company_name.as_deref(),
            address: address.as_deref(),
            phone: phone.as_deref(),
            registration_number: registration_number.as_deref(),
        })
        .await
    {
        Ok(id) => id,
        // Lost a race with a concurrent registration of the same email.
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    info!(user_id = id, "User registered");

    session_response(
        &state,
        StatusCode::CREATED,
        None,
        UserProfile {
            id,
            name: name.to_string(),
            email: email.to_string(),
        },
    )
}

async fn login(
    State(state): State<AccountState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let Some(user) = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to look up user")?
    else {
        verify_missing_account(payload.password)
            .await
            .internal_err("Failed to verify password")?;
        warn!("Login failed: unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    let valid = verify_password(payload.password, user.password_hash.clone())
        .await
        .internal_err("Failed to verify password")?;
    if !valid {
        warn!(user_id = user.id, "Login failed: wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    info!(user_id = user.id, "User logged in");

    session_response(
        &state,
        StatusCode::OK,
        Some("Login successful"),
        user.profile(),
    )
}

/// Always succeeds, with or without a session.
async fn logout(State(state): State<AccountState>) -> Response {
    let mut response = Json(json!({ "success": true })).into_response();
    state.transport.clear(response.headers_mut());
    response
}

async fn me(ApiAuth(auth): ApiAuth) -> Json<UserResponse> {
    Json(UserResponse {
        user: auth.user.profile(),
    })
}

async fn update_profile(
    State(state): State<AccountState>,
    ApiAuth(auth): ApiAuth,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let name = payload.name.map(|n| n.trim().to_string());
    if name.as_deref().is_some_and(str::is_empty) {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }

    let update = ProfileUpdate {
        name: name.as_deref(),
        company_name: payload.company_name.as_deref().map(str::trim),
        address: payload.address.as_deref().map(str::trim),
        phone: payload.phone.as_deref().map(str::trim),
        registration_number: payload.registration_number.as_deref().map(str::trim),
    };

    let users = state.db.users();
    if !users
        .update_profile(auth.id(), &update)
        .await
        .db_err("Failed to update profile")?
    {
        return Err(ApiError::not_found("User not found"));
    }

    let user = users
        .get_by_id(auth.id())
        .await
        .db_err("Failed to load profile")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(user_id = user.id, "Profile updated");
    Ok(Json(UserResponse {
        user: user.profile(),
    }))
}

async fn change_password(
    State(state): State<AccountState>,
    ApiAuth(auth): ApiAuth,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::bad_request(
            "Current password and new password are required",
        ));
    }
    validate_password(&payload.new_password)?;

    let valid = verify_password(payload.current_password, auth.user.password_hash.clone())
        .await
        .internal_err("Failed to verify password")?;
    if !valid {
        warn!(user_id = auth.id(), "Password change rejected: wrong current password");
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let password_hash = hash_password(payload.new_password)
        .await
        .internal_err("Failed to hash password")?;
    state
        .db
        .users()
        .update_password(auth.id(), &password_hash)
        .await
        .db_err("Failed to update password")?;

    info!(user_id = auth.id(), "Password changed");
    Ok(Json(json!({ "success": true })))
}

/// Mint a new pair from the renewal cookie alone.
async fn refresh(
    State(state): State<AccountState>,
    headers: HeaderMap,
) -> Result<Response, ApiAuthError> {
    let resolved = renew_session(&headers, &state)
        .await
        .map_err(|e| ApiAuthError::new(e, state.transport.clone()))?;

    let mut response = Json(json!({ "success": true })).into_response();
    if let Some(pair) = resolved.refreshed {
        state.transport.attach(response.headers_mut(), &pair);
    }
    Ok(response)
}
