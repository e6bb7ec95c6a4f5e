//! Credential issuing and verification with the configured keys and lifetimes.

use std::time::Duration;

use super::codec::{
    Access, Credential, CredentialError, PasswordReset, Renewal, SigningKey, SubjectClaims,
    VerifiedClaims,
};

/// Access token duration: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Password reset token duration: 1 hour
pub const RESET_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Signing keys and lifetimes, built once at startup and shared by reference.
#[derive(Clone)]
pub struct JwtConfig {
    access: SigningKey<Access>,
    renewal: SigningKey<Renewal>,
    reset: SigningKey<PasswordReset>,
    access_ttl: Duration,
    renewal_ttl: Duration,
    reset_ttl: Duration,
}

/// An access credential and its renewal credential, minted together.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access: Credential<Access>,
    pub renewal: Credential<Renewal>,
}

impl JwtConfig {
    /// Create a configuration with the default lifetimes.
    ///
    /// Password reset links are signed with the access secret; their `typ`
    /// claim keeps them from verifying as access credentials.
    pub fn new(access_secret: &[u8], renewal_secret: &[u8]) -> Self {
        Self {
            access: SigningKey::new(access_secret),
            renewal: SigningKey::new(renewal_secret),
            reset: SigningKey::new(access_secret),
            access_ttl: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            renewal_ttl: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
            reset_ttl: Duration::from_secs(RESET_TOKEN_DURATION_SECS),
        }
    }

    /// Override the access and renewal lifetimes.
    pub fn with_ttls(mut self, access_ttl: Duration, renewal_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.renewal_ttl = renewal_ttl;
        self
    }

    /// Mint a fresh (access, renewal) pair for `subject`.
    pub fn issue(&self, subject: &SubjectClaims) -> Result<CredentialPair, CredentialError> {
        let access = self.access.encode(subject, self.access_ttl)?;
        let renewal = self.renewal.encode(subject, self.renewal_ttl)?;
        Ok(CredentialPair { access, renewal })
    }

    /// Mint a password reset credential for `subject`.
    pub fn issue_password_reset(
        &self,
        subject: &SubjectClaims,
    ) -> Result<Credential<PasswordReset>, CredentialError> {
        self.reset.encode(subject, self.reset_ttl)
    }

    pub fn verify_access(&self, token: &str) -> Result<VerifiedClaims<Access>, CredentialError> {
        self.access.decode(token)
    }

    pub fn verify_renewal(&self, token: &str) -> Result<VerifiedClaims<Renewal>, CredentialError> {
        self.renewal.decode(token)
    }

    pub fn verify_password_reset(
        &self,
        token: &str,
    ) -> Result<VerifiedClaims<PasswordReset>, CredentialError> {
        self.reset.decode(token)
    }
}
