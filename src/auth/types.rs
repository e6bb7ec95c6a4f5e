//! Authentication user types.

use crate::db::User;

use super::resolver::SessionState;

/// The caller behind a request, as resolved from its credentials.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Current identity store record (re-fetched on every request)
    pub user: User,
    /// How the session was established for this request
    pub session: SessionState,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    /// True when this request minted a fresh credential pair.
    pub fn was_renewed(&self) -> bool {
        self.session == SessionState::AccessExpiredRenewalValid
    }
}
