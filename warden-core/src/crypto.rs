//! Hashing and comparison helpers
//!
//! Refresh tokens are persisted as SHA-256 digests and compared in constant
//! time. Passwords go through `password-auth` (Argon2 by default), which
//! also verifies bcrypt and scrypt hashes produced by other systems.

use std::sync::LazyLock;

use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{Error, error::CryptoError};

/// Hash verified against when the login identifier matches no account, so
/// that an unknown email costs the same as a wrong password.
static DUMMY_PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| password_auth::generate_hash("warden-dummy-password"));

/// Generate a 256-bit random token, URL-safe base64 encoded.
///
/// # Panics
///
/// Panics if the OS random number generator fails. This indicates a critical
/// system failure from which recovery is not possible.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Hex-encoded SHA-256 of a token, suitable for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a token against a stored hash with constant-time comparison.
pub fn verify_token_hash(token: &str, stored_hash: &str) -> bool {
    let computed_hash = hash_token(token);
    constant_time_compare(computed_hash.as_bytes(), stored_hash.as_bytes())
}

pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hash a password off the async runtime.
pub async fn hash_password(password: &str) -> Result<String, Error> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || password_auth::generate_hash(password))
        .await
        .map_err(|e| Error::Crypto(CryptoError::PasswordHash(e.to_string())))
}

/// Verify a password against a stored hash off the async runtime.
///
/// Passing `None` verifies against a fixed dummy hash and always returns
/// `false`, which keeps the cost of a lookup miss equal to a mismatch.
pub async fn verify_password(password: &str, hash: Option<&str>) -> Result<bool, Error> {
    let password = password.to_string();
    let known = hash.is_some();
    let hash = hash.map(str::to_string);
    let matched = tokio::task::spawn_blocking(move || {
        let target = hash.as_deref().unwrap_or(DUMMY_PASSWORD_HASH.as_str());
        password_auth::verify_password(password, target).is_ok()
    })
    .await
    .map_err(|e| Error::Crypto(CryptoError::PasswordHash(e.to_string())))?;

    Ok(known && matched)
}
