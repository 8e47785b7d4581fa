//! Prefixed identifier generation
//!
//! Identifiers look like `acc_Zm9vYmFyYmF6cXV4` and carry at least 96 bits
//! of entropy, base64 URL-safe encoded without padding.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

/// Generate a prefixed ID with 96 bits of entropy
///
/// # Panics
///
/// Panics if the OS random number generator fails.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");

    format!("{prefix}_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Validate that a prefixed ID has the expected format
///
/// Returns `true` if `id` is `{expected_prefix}_` followed by base64 that
/// decodes to at least 12 bytes.
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= 12,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("acc");
        assert!(id.starts_with("acc_"));

        let id2 = generate_prefixed_id("acc");
        assert_ne!(id, id2);
    }

    #[test]
    fn test_validate_prefixed_id() {
        let id = generate_prefixed_id("acc");
        assert!(validate_prefixed_id(&id, "acc"));
        assert!(!validate_prefixed_id(&id, "file"));

        assert!(!validate_prefixed_id("acc", "acc"));
        assert!(!validate_prefixed_id("acc_", "acc"));
        assert!(!validate_prefixed_id("acc_invalid!", "acc"));
        assert!(!validate_prefixed_id("accx_AAAAAAAAAAAAAAAA", "acc"));
    }

    #[test]
    fn test_id_is_url_safe() {
        let id = generate_prefixed_id("acc");
        assert!(
            id.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }
}
