//! Signed credential encoding and verification.
//!
//! Every credential kind carries its own key type, so a renewal token cannot be
//! verified with the access key (or handed to code expecting an access token)
//! without a compile error.

use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Value of the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    PasswordReset,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Access {}
    impl Sealed for super::Renewal {}
    impl Sealed for super::PasswordReset {}
}

/// Marker trait implemented by the three credential kinds.
pub trait CredentialKind: sealed::Sealed + Copy + Send + Sync + 'static {
    const TOKEN_TYPE: TokenType;
}

/// Short-lived credential proving recent authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access;

/// Long-lived credential used only to mint a new pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renewal;

/// Single-use credential carried in a password reset link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordReset;

impl CredentialKind for Access {
    const TOKEN_TYPE: TokenType = TokenType::Access;
}

impl CredentialKind for Renewal {
    const TOKEN_TYPE: TokenType = TokenType::Refresh;
}

impl CredentialKind for PasswordReset {
    const TOKEN_TYPE: TokenType = TokenType::PasswordReset;
}

/// The identity embedded in every credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectClaims {
    pub subject_id: i64,
    pub email: String,
}

/// JWT payload as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenClaims {
    /// Subject (user id, as a decimal string)
    sub: String,
    email: String,
    #[serde(rename = "typ")]
    token_type: TokenType,
    /// Random per-token id
    jti: String,
    iat: u64,
    exp: u64,
}

/// An encoded credential of kind `K`.
#[derive(Debug, Clone)]
pub struct Credential<K> {
    token: String,
    jti: String,
    issued_at: u64,
    expires_at: u64,
    ttl: u64,
    _kind: PhantomData<K>,
}

impl<K> Credential<K> {
    /// The signed token string.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn jti(&self) -> &str {
        &self.jti
    }

    /// Issued at (Unix seconds)
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Expiration (Unix seconds)
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Lifetime in seconds, used for cookie `Max-Age`.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl
    }
}

/// Claims of a credential that passed signature, type and expiry checks.
#[derive(Debug, Clone)]
pub struct VerifiedClaims<K> {
    pub subject: SubjectClaims,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
    _kind: PhantomData<K>,
}

/// HS256 key pair for one credential kind.
#[derive(Clone)]
pub struct SigningKey<K> {
    encoding: EncodingKey,
    decoding: DecodingKey,
    _kind: PhantomData<K>,
}

impl<K: CredentialKind> SigningKey<K> {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            _kind: PhantomData,
        }
    }

    /// Encode `subject` into a credential that expires `ttl` from now.
    pub fn encode(
        &self,
        subject: &SubjectClaims,
        ttl: Duration,
    ) -> Result<Credential<K>, CredentialError> {
        self.encode_at(subject, ttl, unix_now()?)
    }

    /// Encode with an explicit issue time (Unix seconds).
    pub(crate) fn encode_at(
        &self,
        subject: &SubjectClaims,
        ttl: Duration,
        now: u64,
    ) -> Result<Credential<K>, CredentialError> {
        let ttl = ttl.as_secs();
        if ttl == 0 {
            return Err(CredentialError::InvalidTtl);
        }

        let claims = TokenClaims {
            sub: subject.subject_id.to_string(),
            email: subject.email.clone(),
            token_type: K::TOKEN_TYPE,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };

        let token = self.sign(&claims)?;

        Ok(Credential {
            token,
            jti: claims.jti,
            issued_at: claims.iat,
            expires_at: claims.exp,
            ttl,
            _kind: PhantomData,
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, CredentialError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(CredentialError::Encoding)
    }

    /// Verify the signature, then the expiry, then the credential kind.
    pub fn decode(&self, token: &str) -> Result<VerifiedClaims<K>, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(CredentialError::from_decode)?;
        let claims = data.claims;

        if claims.token_type != K::TOKEN_TYPE {
            return Err(CredentialError::SignatureInvalid);
        }

        let subject_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| CredentialError::Malformed)?;

        Ok(VerifiedClaims {
            subject: SubjectClaims {
                subject_id,
                email: claims.email,
            },
            jti: claims.jti,
            issued_at: claims.iat,
            expires_at: claims.exp,
            _kind: PhantomData,
        })
    }
}

/// Low-level codec failures. Callers above the resolver never see these directly.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential is malformed")]
    Malformed,
    #[error("credential has expired")]
    Expired,
    #[error("credential signature is invalid")]
    SignatureInvalid,
    #[error("credential lifetime must be at least one second")]
    InvalidTtl,
    #[error("failed to encode credential: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
    #[error("system clock is set before the Unix epoch")]
    Clock,
}

impl CredentialError {
    fn from_decode(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::SignatureInvalid,
            _ => Self::Malformed,
        }
    }
}

pub(crate) fn unix_now() -> Result<u64, CredentialError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| CredentialError::Clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SubjectClaims {
        SubjectClaims {
            subject_id: 42,
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let key = SigningKey::<Access>::new(b"test-secret-key-for-testing");

        for ttl in [1, 60, 3600, 7 * 24 * 3600] {
            let credential = key.encode(&alice(), Duration::from_secs(ttl)).unwrap();
            assert_eq!(credential.ttl_secs(), ttl);
            assert_eq!(credential.expires_at(), credential.issued_at() + ttl);

            let claims = key.decode(credential.token()).unwrap();
            assert_eq!(claims.subject, alice());
            assert_eq!(claims.expires_at, credential.expires_at());
            assert_eq!(claims.jti, credential.jti());
        }
    }

    #[test]
    fn test_key_isolation() {
        let access = SigningKey::<Access>::new(b"access-secret");
        let renewal = SigningKey::<Renewal>::new(b"renewal-secret");

        let a = access.encode(&alice(), Duration::from_secs(60)).unwrap();
        let r = renewal.encode(&alice(), Duration::from_secs(60)).unwrap();

        // Re-key each decoder to the other kind's secret so only the key differs.
        let access_with_renewal_secret = SigningKey::<Access>::new(b"renewal-secret");
        let renewal_with_access_secret = SigningKey::<Renewal>::new(b"access-secret");

        assert!(matches!(
            access_with_renewal_secret.decode(a.token()),
            Err(CredentialError::SignatureInvalid)
        ));
        assert!(matches!(
            renewal_with_access_secret.decode(r.token()),
            Err(CredentialError::SignatureInvalid)
        ));
        assert!(matches!(
            access.decode(r.token()),
            Err(CredentialError::SignatureInvalid)
        ));
        assert!(matches!(
            renewal.decode(a.token()),
            Err(CredentialError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_same_secret_different_kind_rejected() {
        let access = SigningKey::<Access>::new(b"shared-secret");
        let renewal = SigningKey::<Renewal>::new(b"shared-secret");

        let r = renewal.encode(&alice(), Duration::from_secs(60)).unwrap();
        assert!(matches!(
            access.decode(r.token()),
            Err(CredentialError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_expired_token() {
        let key = SigningKey::<Access>::new(b"test-secret");
        let now = unix_now().unwrap();

        // Expired 50 seconds ago
        let credential = key
            .encode_at(&alice(), Duration::from_secs(50), now - 100)
            .unwrap();

        assert!(matches!(
            key.decode(credential.token()),
            Err(CredentialError::Expired)
        ));
    }

    #[test]
    fn test_expiry_boundary_after_delay() {
        let key = SigningKey::<Renewal>::new(b"test-secret");
        let credential = key.encode(&alice(), Duration::from_secs(1)).unwrap();

        std::thread::sleep(Duration::from_secs(2));

        assert!(matches!(
            key.decode(credential.token()),
            Err(CredentialError::Expired)
        ));
    }

    #[test]
    fn test_expired_token_with_wrong_key_reports_signature() {
        let key = SigningKey::<Access>::new(b"secret-1");
        let other = SigningKey::<Access>::new(b"secret-2");
        let now = unix_now().unwrap();

        let credential = key
            .encode_at(&alice(), Duration::from_secs(10), now - 100)
            .unwrap();

        assert!(matches!(
            other.decode(credential.token()),
            Err(CredentialError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let key = SigningKey::<Access>::new(b"test-secret");
        let credential = key.encode(&alice(), Duration::from_secs(60)).unwrap();

        let mut parts: Vec<String> = credential.token().split('.').map(String::from).collect();
        let payload = parts[1].clone();
        let last = payload.chars().last().unwrap();
        let swapped = if last == 'A' { 'B' } else { 'A' };
        parts[1] = format!("{}{}", &payload[..payload.len() - 1], swapped);
        let tampered = parts.join(".");

        assert!(key.decode(&tampered).is_err());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let key = SigningKey::<Access>::new(b"test-secret");
        let claims = TokenClaims {
            sub: "42".to_string(),
            email: "alice@example.com".to_string(),
            token_type: TokenType::Access,
            jti: "fixed".to_string(),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
        };

        assert_eq!(key.sign(&claims).unwrap(), key.sign(&claims).unwrap());
    }

    #[test]
    fn test_malformed_token() {
        let key = SigningKey::<Access>::new(b"test-secret");

        assert!(matches!(
            key.decode("invalid-token"),
            Err(CredentialError::Malformed)
        ));
        assert!(matches!(key.decode(""), Err(CredentialError::Malformed)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let key = SigningKey::<Access>::new(b"test-secret");
        assert!(matches!(
            key.encode(&alice(), Duration::ZERO),
            Err(CredentialError::InvalidTtl)
        ));
    }

    #[test]
    fn test_unique_jti_per_token() {
        let key = SigningKey::<Renewal>::new(b"test-secret");

        let first = key.encode(&alice(), Duration::from_secs(60)).unwrap();
        let second = key.encode(&alice(), Duration::from_secs(60)).unwrap();

        assert_ne!(first.jti(), second.jti());
        assert_ne!(first.token(), second.token());
    }
}
