//! Cookie transport for the credential pair.

use axum::http::{HeaderMap, HeaderValue, header};
use tracing::error;

use crate::jwt::CredentialPair;

/// Cookie name for the access token (short-lived).
pub const ACCESS_COOKIE_NAME: &str = "auth_token";

/// Cookie name for the refresh token (long-lived).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Older name of the refresh cookie, still accepted on read and cleared on logout.
pub const LEGACY_REFRESH_COOKIE_NAME: &str = "reset_refresh_token";

/// `SameSite` attribute for the auth cookies.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Reads, writes and clears the access/refresh cookies.
#[derive(Debug, Clone)]
pub struct CookieTransport {
    secure: bool,
    same_site: SameSite,
}

impl CookieTransport {
    /// `secure` should be true everywhere except local HTTP development.
    pub fn new(secure: bool, same_site: SameSite) -> Self {
        Self { secure, same_site }
    }

    /// Append `Set-Cookie` headers for both credentials.
    pub fn attach(&self, headers: &mut HeaderMap, pair: &CredentialPair) {
        append_cookie(
            headers,
            self.cookie(
                ACCESS_COOKIE_NAME,
                pair.access.token(),
                pair.access.ttl_secs(),
            ),
        );
        append_cookie(
            headers,
            self.cookie(
                REFRESH_COOKIE_NAME,
                pair.renewal.token(),
                pair.renewal.ttl_secs(),
            ),
        );
    }

    /// The access cookie value, if present and non-empty.
    pub fn read_access<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        get_cookie(headers, ACCESS_COOKIE_NAME).filter(|v| !v.is_empty())
    }

    /// The refresh cookie value, if present and non-empty.
    pub fn read_renewal<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        get_cookie(headers, REFRESH_COOKIE_NAME)
            .filter(|v| !v.is_empty())
            .or_else(|| get_cookie(headers, LEGACY_REFRESH_COOKIE_NAME).filter(|v| !v.is_empty()))
    }

    /// Overwrite all auth cookies with expired, empty values.
    pub fn clear(&self, headers: &mut HeaderMap) {
        for name in [
            ACCESS_COOKIE_NAME,
            REFRESH_COOKIE_NAME,
            LEGACY_REFRESH_COOKIE_NAME,
        ] {
            append_cookie(headers, self.expired_cookie(name));
        }
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            name,
            value,
            self.same_site.as_str(),
            max_age,
            self.secure_suffix()
        )
    }

    fn expired_cookie(&self, name: &str) -> String {
        format!(
            "{}=; HttpOnly; SameSite={}; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{}",
            name,
            self.same_site.as_str(),
            self.secure_suffix()
        )
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }
}

fn append_cookie(headers: &mut HeaderMap, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, "Failed to build Set-Cookie header"),
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}
