use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Practical subset of RFC 5322, compiled once.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Optional leading `+`, then 7 to 15 digits with spaces or dashes between groups.
static MOBILE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("Invalid mobile regex pattern")
});

/// Normalize a login identifier: trimmed and lowercased.
///
/// Lockout keys and account lookups both go through this so that
/// `A@x.com` and `a@x.com ` share one failure counter.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates an email address
///
/// # Examples
///
/// ```rust
/// use warden_core::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("invalid-email").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > 254 {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// Validates a new password
///
/// # Password Requirements
///
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - Cannot be whitespace only
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(
            "Password is required".to_string(),
        ));
    }

    if password.trim().is_empty() {
        return Err(ValidationError::InvalidPassword(
            "Password cannot be only whitespace".to_string(),
        ));
    }

    if password.chars().count() < 8 {
        return Err(ValidationError::InvalidPassword(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(ValidationError::InvalidPassword(
            "Password must be no more than 128 characters long".to_string(),
        ));
    }

    Ok(())
}

/// Validates a display name: non-blank, at most 100 characters.
pub fn validate_full_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::InvalidName(
            "Name cannot be empty or whitespace only".to_string(),
        ));
    }

    if name.chars().count() > 100 {
        return Err(ValidationError::InvalidName(
            "Name must be no more than 100 characters long".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_mobile_number(mobile: &str) -> Result<(), ValidationError> {
    if MOBILE_REGEX.is_match(mobile.trim()) {
        let digits = mobile.chars().filter(char::is_ascii_digit).count();
        if (7..=15).contains(&digits) {
            return Ok(());
        }
    }

    Err(ValidationError::InvalidMobileNumber(mobile.to_string()))
}

pub fn validate_bio(bio: &str) -> Result<(), ValidationError> {
    if bio.chars().count() > 500 {
        return Err(ValidationError::InvalidField(
            "Bio must be no more than 500 characters long".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("test.email+tag@domain.co.uk").is_ok());
        assert!(validate_email("a@x.com").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("@domain.com").is_err());
        assert!(validate_email("user@domain").is_err());

        let long_email = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long_email).is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.com "), "a@x.com");
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("12345678").is_ok());

        assert!(matches!(
            validate_password(""),
            Err(ValidationError::MissingField(_))
        ));
        assert!(validate_password("        ").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_full_name() {
        assert!(validate_full_name("José María García-López").is_ok());
        assert!(validate_full_name("   ").is_err());
        assert!(validate_full_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_mobile_number() {
        assert!(validate_mobile_number("+1 555-123-4567").is_ok());
        assert!(validate_mobile_number("9876543210").is_ok());

        assert!(validate_mobile_number("12345").is_err());
        assert!(validate_mobile_number("call me").is_err());
        assert!(validate_mobile_number("+1234567890123456").is_err());
    }

    #[test]
    fn test_validate_bio() {
        assert!(validate_bio("").is_ok());
        assert!(validate_bio(&"b".repeat(501)).is_err());
    }
}
