pub mod utilities;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Message returned for every authentication failure, whatever the cause.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// Message returned for every token failure, whatever the cause.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Message returned for internal failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(#[from] RateLimitExceeded),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Account no longer exists")]
    AccountMissing,
}

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("Role not permitted: {0}")]
    RoleNotPermitted(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Token missing")]
    MissingToken,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Refresh token revoked or superseded")]
    Revoked,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid {0}")]
    MalformedId(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid mobile number: {0}")]
    InvalidMobileNumber(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Passwords do not match")]
    PasswordMismatch,
}

/// Rejection produced by a rate limiter once a client exhausted its quota.
#[derive(Debug, Clone, Error)]
#[error("limit of {limit} requests reached, retry after {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub limit: u64,
    pub remaining: u64,
    pub retry_after_secs: u64,
    pub reset_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("{0} timed out")]
    Timeout(String),

    #[error("{0} unavailable: {1}")]
    Unavailable(String, String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("JWT signing failed: {0}")]
    JwtSigning(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Coarse classification used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    RateLimited,
    Conflict,
    NotFound,
    Dependency,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Storage(StorageError::MalformedId(_)) => ErrorKind::Validation,
            Error::Auth(_) | Error::Session(_) => ErrorKind::Authentication,
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::Storage(StorageError::Conflict(_)) => ErrorKind::Conflict,
            Error::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            Error::Dependency(_) => ErrorKind::Dependency,
            Error::Storage(StorageError::Database(_))
            | Error::Storage(StorageError::Connection(_))
            | Error::Crypto(_) => ErrorKind::Internal,
        }
    }

    /// The message safe to show to a caller.
    ///
    /// Credential and token failures collapse to one message each so the
    /// response never reveals which check failed.
    pub fn public_message(&self) -> String {
        match self {
            Error::Auth(_) => INVALID_CREDENTIALS_MESSAGE.to_string(),
            Error::Session(_) => UNAUTHORIZED_MESSAGE.to_string(),
            Error::Authorization(_) => {
                "Forbidden: you do not have permission to access this resource".to_string()
            }
            Error::Validation(e) => e.to_string(),
            Error::Storage(StorageError::Conflict(msg)) => msg.clone(),
            Error::Storage(StorageError::NotFound) => "Resource not found".to_string(),
            Error::Storage(e @ StorageError::MalformedId(_)) => e.to_string(),
            Error::RateLimited(e) => e.message.clone(),
            Error::Dependency(_) => "Service temporarily unavailable".to_string(),
            Error::Storage(_) | Error::Crypto(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Authentication)
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation)
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_dependency_error(&self) -> bool {
        matches!(self, Error::Dependency(_))
    }
}
