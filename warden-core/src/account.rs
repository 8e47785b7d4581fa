//! Accounts and roles
//!
//! An account is the durable identity record. It owns the credential hash
//! and the hash of the single refresh token currently valid for it.
//!
//! | Field                | Type               | Description                                     |
//! | -------------------- | ------------------ | ----------------------------------------------- |
//! | `id`                 | `AccountId`        | Opaque identifier, `acc_` prefixed.             |
//! | `full_name`          | `String`           | Display name, copied into access tokens.        |
//! | `email`              | `String`           | Unique login identifier, stored normalized.     |
//! | `mobile_number`      | `String`           | Contact number.                                 |
//! | `bio`                | `String`           | Free text.                                      |
//! | `role`               | `Role`             | `student`, `teacher` or `admin`.                |
//! | `password_hash`      | `String`           | PHC string, never serialized.                   |
//! | `avatar`             | `Avatar`           | Reference into file storage.                    |
//! | `refresh_token_hash` | `Option<String>`   | SHA-256 of the current refresh token, if any.   |
//! | `created_at`         | `DateTime`         | Creation timestamp.                             |
//! | `updated_at`         | `DateTime`         | Last modification timestamp.                    |
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::{StorageError, ValidationError, utilities::RequiredFieldExt},
    id::{generate_prefixed_id, validate_prefixed_id},
    validation::normalize_email,
};

const ACCOUNT_ID_PREFIX: &str = "acc";

/// A unique, stable identifier for an account
///
/// This value should be treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: &str) -> Self {
        AccountId(id.to_string())
    }

    pub fn new_random() -> Self {
        AccountId(generate_prefixed_id(ACCOUNT_ID_PREFIX))
    }

    /// Parse an identifier coming from outside (a path segment, a token claim).
    ///
    /// Malformed input becomes `StorageError::MalformedId`, which maps to a
    /// 400 at the HTTP boundary rather than reaching the store.
    pub fn parse(id: &str) -> Result<Self, Error> {
        let id = AccountId::new(id);
        if id.is_valid() {
            Ok(id)
        } else {
            Err(StorageError::MalformedId(format!("account id: {}", id.0)).into())
        }
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, ACCOUNT_ID_PREFIX)
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}

/// Reference to a stored avatar image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub id: String,
    pub url: String,
}

#[derive(Clone)]
pub struct Account {
    pub id: AccountId,
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub bio: String,
    pub role: Role,
    pub password_hash: String,
    pub avatar: Avatar,
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn profile(&self) -> AccountProfile {
        AccountProfile::from(self)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_session(&self) -> bool {
        self.refresh_token_hash.is_some()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password_hash", &"<redacted>")
            .field(
                "refresh_token_hash",
                &self.refresh_token_hash.as_ref().map(|_| "<redacted>"),
            )
            .finish_non_exhaustive()
    }
}

/// The caller-visible view of an account. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: AccountId,
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub bio: String,
    pub role: Role,
    pub avatar: Avatar,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountProfile {
    fn from(account: &Account) -> Self {
        AccountProfile {
            id: account.id.clone(),
            full_name: account.full_name.clone(),
            email: account.email.clone(),
            mobile_number: account.mobile_number.clone(),
            bio: account.bio.clone(),
            role: account.role,
            avatar: account.avatar.clone(),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// A fully validated account ready to be inserted.
#[derive(Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub bio: String,
    pub role: Role,
    pub password_hash: String,
    pub avatar: Avatar,
}

impl NewAccount {
    pub fn builder() -> NewAccountBuilder {
        NewAccountBuilder::default()
    }

    /// Materialize the record a store would hold right after insertion.
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account {
            id: self.id,
            full_name: self.full_name,
            email: self.email,
            mobile_number: self.mobile_number,
            bio: self.bio,
            role: self.role,
            password_hash: self.password_hash,
            avatar: self.avatar,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct NewAccountBuilder {
    id: Option<AccountId>,
    full_name: Option<String>,
    email: Option<String>,
    mobile_number: Option<String>,
    bio: Option<String>,
    role: Option<Role>,
    password_hash: Option<String>,
    avatar: Option<Avatar>,
}

impl NewAccountBuilder {
    pub fn id(mut self, id: AccountId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn mobile_number(mut self, mobile_number: impl Into<String>) -> Self {
        self.mobile_number = Some(mobile_number.into());
        self
    }

    pub fn bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn password_hash(mut self, password_hash: impl Into<String>) -> Self {
        self.password_hash = Some(password_hash.into());
        self
    }

    pub fn avatar(mut self, avatar: Avatar) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn build(self) -> Result<NewAccount, Error> {
        Ok(NewAccount {
            id: self.id.unwrap_or_default(),
            full_name: self.full_name.require_field("Full name")?,
            email: normalize_email(&self.email.require_field("Email")?),
            mobile_number: self.mobile_number.require_field("Mobile number")?,
            bio: self.bio.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
            password_hash: self.password_hash.require_field("Password")?,
            avatar: self.avatar.require_field("Avatar")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avatar() -> Avatar {
        Avatar {
            id: "file_1".to_string(),
            url: "/uploads/avatars/file_1.png".to_string(),
        }
    }

    #[test]
    fn test_account_id() {
        let id = AccountId::new_random();
        assert!(id.is_valid());
        assert!(id.as_str().starts_with("acc_"));
        assert_eq!(AccountId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_malformed_account_id() {
        let err = AccountId::parse("not-an-id").unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::MalformedId(_))));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Student);
        assert_eq!(serde_json::to_string(&Role::Teacher).unwrap(), "\"teacher\"");
    }

    #[test]
    fn test_builder_normalizes_email_and_defaults_role() {
        let account = NewAccount::builder()
            .full_name("Ada Lovelace")
            .email(" Ada@Example.com ")
            .mobile_number("5551234567")
            .password_hash("$argon2id$stub")
            .avatar(avatar())
            .build()
            .unwrap();

        assert_eq!(account.email, "ada@example.com");
        assert_eq!(account.role, Role::Student);
        assert!(account.id.is_valid());
    }

    #[test]
    fn test_builder_requires_fields() {
        let err = NewAccount::builder()
            .full_name("Ada Lovelace")
            .email("ada@example.com")
            .mobile_number("5551234567")
            .password_hash("$argon2id$stub")
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField(ref msg)) if msg == "Avatar is required"
        ));
    }

    #[test]
    fn test_profile_and_debug_hide_secrets() {
        let mut account = NewAccount::builder()
            .full_name("Ada Lovelace")
            .email("ada@example.com")
            .mobile_number("5551234567")
            .password_hash("$argon2id$secret")
            .avatar(avatar())
            .build()
            .unwrap()
            .into_account(Utc::now());
        account.refresh_token_hash = Some("deadbeef".to_string());

        let json = serde_json::to_string(&account.profile()).unwrap();
        assert!(json.contains("\"fullName\":\"Ada Lovelace\""));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("deadbeef"));

        let debug = format!("{account:?}");
        assert!(!debug.contains("argon2"));
        assert!(!debug.contains("deadbeef"));
    }
}
