//! Password digests (argon2id).
//!
//! Hashing is CPU-bound, so it runs on the blocking pool.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Digest checked when a login names no account, so a miss costs one
/// Argon2 verification like a wrong password does.
static MISSING_ACCOUNT_HASH: LazyLock<Result<String, String>> =
    LazyLock::new(|| hash_blocking("no-such-account").map_err(|e| e.to_string()));

static MISSING_ACCOUNT_CHECKS: AtomicU64 = AtomicU64::new(0);

fn hash_blocking(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

fn verify_blocking(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hash a password into a PHC string.
pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_blocking(&password)).await?
}

/// Check a password against a stored PHC string.
pub async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_blocking(&password, &hash)).await?
}

/// Spend the same work as [`verify_password`] for a login whose email has no
/// account. The outcome is always a rejection.
pub async fn verify_missing_account(password: String) -> Result<(), PasswordError> {
    tokio::task::spawn_blocking(move || {
        MISSING_ACCOUNT_CHECKS.fetch_add(1, Ordering::Relaxed);
        let hash = MISSING_ACCOUNT_HASH
            .as_deref()
            .map_err(|e| PasswordError::Hash(e.clone()))?;
        verify_blocking(&password, hash).map(|_| ())
    })
    .await?
}

/// Number of [`verify_missing_account`] runs in this process.
pub fn missing_account_checks() -> u64 {
    MISSING_ACCOUNT_CHECKS.load(Ordering::Relaxed)
}
