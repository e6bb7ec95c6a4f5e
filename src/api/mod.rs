mod account;
mod error;
mod password_reset;

use axum::Router;
use std::sync::Arc;
use url::Url;

use crate::auth::CookieTransport;
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use account::AccountState;
pub use error::{ApiError, MIN_PASSWORD_LEN, ResultExt};
pub use password_reset::{LogResetDelivery, PasswordResetState, ResetDelivery};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    transport: CookieTransport,
    rate_limit_config: Arc<RateLimitConfig>,
    public_origin: Url,
    reset_delivery: Arc<dyn ResetDelivery>,
) -> Router {
    let account_state = AccountState {
        db: db.clone(),
        jwt: jwt.clone(),
        transport: transport.clone(),
        rate_limit_config: rate_limit_config.clone(),
    };

    let password_reset_state = PasswordResetState {
        db,
        jwt,
        transport,
        public_origin,
        delivery: reset_delivery,
        rate_limit_config,
    };

    Router::new().nest(
        "/auth",
        account::router(account_state).merge(password_reset::router(password_reset_state)),
    )
}
