//! Per-request session resolution.
//!
//! A request carries up to two credentials: a short-lived access credential
//! and a long-lived renewal credential. The access credential is tried first.
//! When it is missing or rejected, a valid renewal credential mints a fresh
//! pair for the same subject. The identity store is consulted on every path,
//! so a deleted account loses access immediately.

use axum::http::HeaderMap;
use tracing::{debug, error, info};

use crate::db::User;
use crate::jwt::{CredentialError, CredentialPair, SubjectClaims};

use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// How the credentials on a request were classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No access and no renewal credential.
    NoCredentials,
    /// The access credential verified.
    AccessValid,
    /// The access credential was missing or rejected; the renewal one verified.
    AccessExpiredRenewalValid,
    /// Credentials were presented but none verified.
    AllInvalid,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub user: AuthenticatedUser,
    /// Present when a new pair was minted; the caller must send it back.
    pub refreshed: Option<CredentialPair>,
}

/// Why a request could not be tied to a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication required ({state:?})")]
    AuthenticationRequired { state: SessionState },
    #[error("session expired")]
    SessionExpired,
    #[error("subject no longer exists")]
    SubjectNotFound,
    #[error("identity store error: {0}")]
    Store(#[source] sqlx::Error),
    #[error("failed to issue credentials: {0}")]
    Issue(#[source] CredentialError),
}

impl SessionError {
    /// True for failures caused by the server rather than the credentials.
    pub fn is_internal(&self) -> bool {
        matches!(self, SessionError::Store(_) | SessionError::Issue(_))
    }
}

/// Resolve the session for a request from its cookies.
pub async fn resolve_session<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<ResolvedSession, SessionError>
where
    S: HasAuthBackend + Sync + ?Sized,
{
    let access = state.transport().read_access(headers);

    if let Some(token) = access {
        match state.jwt().verify_access(token) {
            Ok(claims) => {
                let user = load_subject(state, claims.subject.subject_id).await?;
                return Ok(ResolvedSession {
                    user: AuthenticatedUser {
                        user,
                        session: SessionState::AccessValid,
                    },
                    refreshed: None,
                });
            }
            Err(e) => debug!(error = %e, "Access credential rejected, trying renewal"),
        }
    }

    if state.transport().read_renewal(headers).is_none() {
        let state = if access.is_some() {
            SessionState::AllInvalid
        } else {
            SessionState::NoCredentials
        };
        return Err(SessionError::AuthenticationRequired { state });
    }

    renew_session(headers, state).await
}

/// Mint a new pair from the renewal credential alone, ignoring any access
/// credential on the request.
pub async fn renew_session<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<ResolvedSession, SessionError>
where
    S: HasAuthBackend + Sync + ?Sized,
{
    let token = state
        .transport()
        .read_renewal(headers)
        .ok_or(SessionError::AuthenticationRequired {
            state: SessionState::NoCredentials,
        })?;

    let claims = state.jwt().verify_renewal(token).map_err(|e| {
        debug!(error = %e, "Renewal credential rejected");
        SessionError::SessionExpired
    })?;

    let user = load_subject(state, claims.subject.subject_id).await?;

    let pair = state
        .jwt()
        .issue(&SubjectClaims {
            subject_id: user.id,
            email: user.email.clone(),
        })
        .map_err(|e| {
            error!(error = %e, "Failed to issue renewed credentials");
            SessionError::Issue(e)
        })?;

    info!(user_id = user.id, "Session renewed");

    Ok(ResolvedSession {
        user: AuthenticatedUser {
            user,
            session: SessionState::AccessExpiredRenewalValid,
        },
        refreshed: Some(pair),
    })
}

async fn load_subject<S>(state: &S, subject_id: i64) -> Result<User, SessionError>
where
    S: HasAuthBackend + Sync + ?Sized,
{
    state
        .db()
        .users()
        .get_by_id(subject_id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to look up session subject");
            SessionError::Store(e)
        })?
        .ok_or_else(|| {
            debug!(subject_id, "Session subject not found");
            SessionError::SubjectNotFound
        })
}
