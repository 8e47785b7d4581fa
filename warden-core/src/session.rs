//! Signed session tokens
//!
//! Two token kinds are issued per login:
//!
//! | Token   | Claims                                      | Lifetime | Stored server side      |
//! | ------- | ------------------------------------------- | -------- | ----------------------- |
//! | access  | `sub`, `name`, `email`, `role`, `iat`, `exp` | minutes  | no                      |
//! | refresh | `sub`, `jti`, `iat`, `exp`                   | days     | SHA-256 on the account  |
//!
//! Access token claims are a snapshot of the account at issuance. A role
//! change becomes visible in tokens only after the next login or rotation.

use std::{fmt, path::Path};

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Error,
    account::{Account, AccountId, Role},
    error::{CryptoError, SessionError, ValidationError},
};

/// JWT algorithm and key material
#[derive(Clone)]
pub enum JwtAlgorithm {
    /// RSA with SHA-256, PEM encoded keys
    RS256 {
        private_key: Vec<u8>,
        public_key: Vec<u8>,
    },
    /// HMAC with SHA-256
    HS256 { secret_key: Vec<u8> },
}

impl fmt::Debug for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JwtAlgorithm::RS256 { .. } => f.write_str("RS256 { .. }"),
            JwtAlgorithm::HS256 { .. } => f.write_str("HS256 { .. }"),
        }
    }
}

/// Signing configuration for one token kind
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub algorithm: JwtAlgorithm,
    /// Issuer claim, checked on verification when set
    pub issuer: Option<String>,
}

impl JwtConfig {
    pub fn new_rs256(private_key: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::RS256 {
                private_key,
                public_key,
            },
            issuer: None,
        }
    }

    pub fn new_hs256(secret_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::HS256 { secret_key },
            issuer: None,
        }
    }

    /// Create a new JWT configuration from RSA key files (PEM format)
    pub fn from_rs256_pem_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        use std::fs::read;

        let private_key = read(private_key_path).map_err(|e| {
            ValidationError::InvalidField(format!("Failed to read private key file: {e}"))
        })?;

        let public_key = read(public_key_path).map_err(|e| {
            ValidationError::InvalidField(format!("Failed to read public key file: {e}"))
        })?;

        Ok(Self::new_rs256(private_key, public_key))
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn jwt_algorithm(&self) -> Algorithm {
        match &self.algorithm {
            JwtAlgorithm::RS256 { .. } => Algorithm::RS256,
            JwtAlgorithm::HS256 { .. } => Algorithm::HS256,
        }
    }

    pub fn get_encoding_key(&self) -> Result<EncodingKey, Error> {
        match &self.algorithm {
            JwtAlgorithm::RS256 { private_key, .. } => EncodingKey::from_rsa_pem(private_key)
                .map_err(|e| CryptoError::InvalidKey(format!("RSA private key: {e}")).into()),
            JwtAlgorithm::HS256 { secret_key } => Ok(EncodingKey::from_secret(secret_key)),
        }
    }

    pub fn get_decoding_key(&self) -> Result<DecodingKey, Error> {
        match &self.algorithm {
            JwtAlgorithm::RS256 { public_key, .. } => DecodingKey::from_rsa_pem(public_key)
                .map_err(|e| CryptoError::InvalidKey(format!("RSA public key: {e}")).into()),
            JwtAlgorithm::HS256 { secret_key } => Ok(DecodingKey::from_secret(secret_key)),
        }
    }

    /// Validation with zero leeway: a token is dead the second `exp` passes.
    pub fn get_validation(&self) -> Validation {
        let mut validation = Validation::new(self.jwt_algorithm());
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }

    /// Sign arbitrary claims with this configuration.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, Error> {
        let header = Header::new(self.jwt_algorithm());
        let encoding_key = self.get_encoding_key()?;

        encode(&header, claims, &encoding_key)
            .map_err(|e| CryptoError::JwtSigning(e.to_string()).into())
    }

    /// Verify signature, expiry and issuer, returning the claims.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, Error> {
        let decoding_key = self.get_decoding_key()?;

        decode::<C>(token, &decoding_key, &self.get_validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired.into(),
                _ => SessionError::InvalidToken(e.to_string()).into(),
            })
    }
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl AccessClaims {
    pub fn for_account(
        account: &Account,
        issued_at: DateTime<Utc>,
        ttl: chrono::Duration,
        issuer: Option<String>,
    ) -> Self {
        Self {
            sub: account.id.to_string(),
            name: account.full_name.clone(),
            email: account.email.clone(),
            role: account.role,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            iss: issuer,
        }
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::new(&self.sub)
    }
}

/// Claims carried by a refresh token
///
/// `jti` makes two refresh tokens issued within the same second distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl RefreshClaims {
    pub fn account_id(&self) -> AccountId {
        AccountId::new(&self.sub)
    }
}

/// A freshly issued access/refresh pair.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}
