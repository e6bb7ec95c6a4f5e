//! JWT credential generation and validation.
//!
//! Two independent secrets sign access and renewal credentials, so holding
//! one never allows forging the other.

mod codec;
mod issuer;

pub use codec::{
    Access, Credential, CredentialError, CredentialKind, PasswordReset, Renewal, SigningKey,
    SubjectClaims, TokenType, VerifiedClaims,
};
pub use issuer::{
    ACCESS_TOKEN_DURATION_SECS, CredentialPair, JwtConfig, REFRESH_TOKEN_DURATION_SECS,
    RESET_TOKEN_DURATION_SECS,
};

pub(crate) use codec::unix_now;
