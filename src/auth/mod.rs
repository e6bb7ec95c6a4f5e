//! Cookie-based session authentication.
//!
//! Dual-credential system: short-lived access credentials and long-lived
//! renewal credentials, signed with independent secrets and carried in
//! HttpOnly cookies. An expired access credential is renewed transparently
//! on the next request that presents a valid renewal credential.

mod cookie;
mod errors;
mod extractors;
mod guard;
mod ip;
mod password;
mod resolver;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookieTransport, LEGACY_REFRESH_COOKIE_NAME, REFRESH_COOKIE_NAME,
    SameSite, get_cookie,
};
pub use errors::{ApiAuthError, GuardRedirect};
pub use extractors::{ApiAuth, MaybeAuth, REFRESHED_CREDENTIALS, attach_refreshed_credentials};
pub use guard::{DEFAULT_PROTECTED_PREFIXES, GuardPolicy, GuardState, route_guard};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use password::{
    PasswordError, hash_password, missing_account_checks, verify_missing_account,
    verify_password,
};
pub use resolver::{ResolvedSession, SessionError, SessionState, renew_session, resolve_session};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
