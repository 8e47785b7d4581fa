use crate::{
    Error,
    error::{StorageError, ValidationError},
};

/// Extension trait for Result types to simplify database error mapping
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err()?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a driver error to a storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a driver error to a storage error, prefixed with `context`
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(format!("{context}: {e}"))))
    }
}

/// Extension trait turning absent or blank request fields into
/// `ValidationError::MissingField`.
pub trait RequiredFieldExt<T> {
    fn require_field(self, field_name: &str) -> Result<T, ValidationError>;
}

impl<T> RequiredFieldExt<T> for Option<T> {
    fn require_field(self, field_name: &str) -> Result<T, ValidationError> {
        self.ok_or_else(|| ValidationError::MissingField(format!("{field_name} is required")))
    }
}

/// Like [`RequiredFieldExt`], but also rejects strings that are empty after trimming.
pub trait RequiredTextExt {
    fn require_text(self, field_name: &str) -> Result<String, ValidationError>;
}

impl RequiredTextExt for Option<String> {
    fn require_text(self, field_name: &str) -> Result<String, ValidationError> {
        match self {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(ValidationError::MissingField(format!(
                "{field_name} is required"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_result_ext() {
        let error_result: Result<i32, &str> = Err("database connection failed");
        match error_result.map_db_err().unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "database connection failed");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_database_result_ext_with_context() {
        let error_result: Result<i32, &str> = Err("timeout");
        match error_result
            .map_db_err_with_context("Failed to save account")
            .unwrap_err()
        {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "Failed to save account: timeout");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_required_field_ext() {
        assert_eq!(Some(3).require_field("Count").unwrap(), 3);

        let none_value: Option<String> = None;
        match none_value.require_field("Email").unwrap_err() {
            ValidationError::MissingField(msg) => assert_eq!(msg, "Email is required"),
            _ => panic!("Expected missing field validation error"),
        }
    }

    #[test]
    fn test_required_text_rejects_blank() {
        assert!(Some("   ".to_string()).require_text("Bio").is_err());
        assert!(None::<String>.require_text("Bio").is_err());
        assert_eq!(
            Some("  hello ".to_string()).require_text("Bio").unwrap(),
            "hello"
        );
    }
}
