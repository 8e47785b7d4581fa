//! Authentication flow.
//!
//! Composes the auth rate limiter, the lockout engine, credential
//! verification and the token session manager. Login runs in this order:
//!
//! 1. auth rate limit for the client key
//! 2. presence of email and password
//! 3. lockout check, before any hash comparison
//! 4. account lookup, where a miss is verified against a dummy hash
//! 5. password comparison, where a mismatch records a failure
//! 6. lockout cleared, tokens issued
//!
//! A locked account, an unknown email and a wrong password all surface as
//! `AuthError`, which renders to the same response at the HTTP boundary.
//! The variants differ only so that logs can tell them apart.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    Error,
    account::AccountId,
    crypto::{hash_password, verify_password},
    error::{
        AuthError, SessionError, ValidationError,
        utilities::{RequiredFieldExt, RequiredTextExt},
    },
    repositories::{AccountRepository, CounterStore},
    services::{
        lockout::LockoutService,
        rate_limit::{ClientKey, RateLimiter},
        token::{IssuedSession, TokenService},
    },
    session::AccessClaims,
    validation::{normalize_email, validate_password},
};

/// Login request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }
}

/// Change password request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

pub struct AuthService<A: AccountRepository, C: CounterStore> {
    accounts: Arc<A>,
    tokens: Arc<TokenService<A>>,
    lockout: Arc<LockoutService<C>>,
    auth_limiter: Arc<RateLimiter<C>>,
}

impl<A: AccountRepository, C: CounterStore> AuthService<A, C> {
    pub fn new(
        accounts: Arc<A>,
        tokens: Arc<TokenService<A>>,
        lockout: Arc<LockoutService<C>>,
        auth_limiter: Arc<RateLimiter<C>>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            lockout,
            auth_limiter,
        }
    }

    /// Authenticate with email and password and open a session.
    ///
    /// `client` is the key to charge against the auth rate limiter. Pass
    /// `None` when the limiter has already been applied upstream, as the
    /// HTTP layer does so it can emit rate limit headers.
    pub async fn login(
        &self,
        credentials: Credentials,
        client: Option<&ClientKey>,
    ) -> Result<IssuedSession, Error> {
        if let Some(client) = client {
            self.auth_limiter.enforce(client).await?;
        }

        let email = credentials.email.require_text("Email")?;
        let password = credentials
            .password
            .filter(|p| !p.is_empty())
            .require_field("Password")?;
        let identity = normalize_email(&email);

        if self.lockout.is_locked(&identity).await? {
            tracing::warn!(identity = %identity, "Login rejected, account locked");
            return Err(AuthError::AccountLocked.into());
        }

        let account = self.accounts.find_by_email(&identity).await?;
        let matched = verify_password(
            &password,
            account.as_ref().map(|a| a.password_hash.as_str()),
        )
        .await?;

        let account = match account {
            Some(account) if matched => account,
            _ => {
                let outcome = self.lockout.record_failure(&identity).await?;
                tracing::info!(
                    identity = %identity,
                    failed_attempts = outcome.failed_attempts,
                    locked_now = outcome.locked_now,
                    "Login rejected, invalid credentials"
                );
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        self.lockout.clear(&identity).await?;
        let tokens = self.tokens.issue(&account).await?;

        tracing::info!(account_id = %account.id, "Login succeeded");
        Ok(IssuedSession {
            account: account.profile(),
            tokens,
        })
    }

    /// Verify an access token and that its account still exists.
    pub async fn authenticate(&self, access_token: &str) -> Result<AccessClaims, Error> {
        let claims = self.tokens.verify_access(access_token)?;
        let account_id = AccountId::new(&claims.sub);

        if !self.accounts.exists(&account_id).await? {
            tracing::warn!(account_id = %account_id, "Access token for a deleted account");
            return Err(AuthError::AccountMissing.into());
        }

        Ok(claims)
    }

    /// End the account's session by revoking its refresh token.
    pub async fn logout(&self, account_id: &AccountId) -> Result<(), Error> {
        self.tokens.revoke(account_id).await?;
        tracing::info!(account_id = %account_id, "Logged out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<IssuedSession, Error> {
        let refresh_token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingToken)?;
        self.tokens.rotate(refresh_token).await
    }

    /// Replace the password and revoke the refresh token in one write.
    pub async fn change_password(
        &self,
        account_id: &AccountId,
        change: PasswordChange,
    ) -> Result<(), Error> {
        let current = change.password.require_field("Password")?;
        let new_password = change.new_password.require_field("New password")?;
        let confirm = change.confirm_password.require_field("Confirm password")?;

        if new_password != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }
        validate_password(&new_password)?;

        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountMissing)?;

        if !verify_password(&current, Some(account.password_hash.as_str())).await? {
            tracing::info!(account_id = %account_id, "Password change rejected, wrong current password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let password_hash = hash_password(&new_password).await?;
        self.accounts
            .set_password_hash(account_id, &password_hash)
            .await?;

        tracing::info!(account_id = %account_id, "Password changed, session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    use super::*;
    use crate::{
        account::{Avatar, NewAccount},
        config::{LockoutConfig, RateLimitConfig, TokenConfig},
        error::ErrorKind,
        storage::{InMemoryAccountRepository, InMemoryCounterStore},
    };

    const TIMEOUT: Duration = Duration::from_millis(500);

    struct Harness {
        auth: AuthService<InMemoryAccountRepository, InMemoryCounterStore>,
        accounts: Arc<InMemoryAccountRepository>,
        tokens: Arc<TokenService<InMemoryAccountRepository>>,
        account_id: AccountId,
    }

    async fn harness(auth_limit: u64) -> Harness {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let counter = Arc::new(InMemoryCounterStore::new());
        let account = accounts
            .create(
                NewAccount::builder()
                    .full_name("Ada Lovelace")
                    .email("a@x.com")
                    .mobile_number("5551234567")
                    .password_hash(hash_password("correct-password").await.unwrap())
                    .avatar(Avatar {
                        id: "avatars/a.png".to_string(),
                        url: "memory://avatars/a.png".to_string(),
                    })
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();

        let tokens = Arc::new(TokenService::new(
            accounts.clone(),
            TokenConfig::hs256(
                b"access_secret_for_tests_only_0123456789".to_vec(),
                b"refresh_secret_for_tests_only_012345678".to_vec(),
            ),
        ));
        let lockout = Arc::new(LockoutService::new(
            counter.clone(),
            LockoutConfig::default(),
            TIMEOUT,
        ));
        let limiter = Arc::new(RateLimiter::new(
            counter,
            RateLimitConfig::auth().with_max_requests(auth_limit),
            TIMEOUT,
        ));

        Harness {
            auth: AuthService::new(accounts.clone(), tokens.clone(), lockout, limiter),
            accounts,
            tokens,
            account_id: account.id,
        }
    }

    fn client() -> ClientKey {
        ClientKey::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 56)
    }

    #[tokio::test]
    async fn test_login_success_returns_profile_and_tokens() {
        let h = harness(100).await;
        let session = h
            .auth
            .login(Credentials::new("A@x.com", "correct-password"), Some(&client()))
            .await
            .unwrap();

        assert_eq!(session.account.id, h.account_id);
        let claims = h.auth.authenticate(&session.tokens.access_token).await.unwrap();
        assert_eq!(claims.account_id(), h.account_id);
    }

    #[tokio::test]
    async fn test_missing_fields_are_validation_errors() {
        let h = harness(100).await;

        let err = h
            .auth
            .login(Credentials::default(), Some(&client()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .auth
            .login(
                Credentials {
                    email: Some("a@x.com".to_string()),
                    password: Some(String::new()),
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_email_looks_like_wrong_password() {
        let h = harness(100).await;

        let unknown = h
            .auth
            .login(Credentials::new("nobody@x.com", "whatever-pass"), None)
            .await
            .unwrap_err();
        let wrong = h
            .auth
            .login(Credentials::new("a@x.com", "wrong-password"), None)
            .await
            .unwrap_err();

        assert_eq!(unknown.kind(), wrong.kind());
        assert_eq!(unknown.public_message(), wrong.public_message());
    }

    #[tokio::test]
    async fn test_lockout_after_five_failures_blocks_correct_password() {
        let h = harness(100).await;

        for _ in 0..5 {
            let err = h
                .auth
                .login(Credentials::new("a@x.com", "wrong-password"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
        }

        let locked = h
            .auth
            .login(Credentials::new("a@x.com", "correct-password"), None)
            .await
            .unwrap_err();
        assert!(matches!(locked, Error::Auth(AuthError::AccountLocked)));
        assert_eq!(
            locked.public_message(),
            Error::Auth(AuthError::InvalidCredentials).public_message()
        );
    }

    #[tokio::test]
    async fn test_auth_rate_limit_short_circuits() {
        let h = harness(2).await;
        let key = client();

        for _ in 0..2 {
            let _ = h
                .auth
                .login(Credentials::new("a@x.com", "wrong-password"), Some(&key))
                .await;
        }

        let err = h
            .auth
            .login(Credentials::new("a@x.com", "correct-password"), Some(&key))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_refresh_requires_token() {
        let h = harness(100).await;
        assert!(matches!(
            h.auth.refresh(None).await,
            Err(Error::Session(SessionError::MissingToken))
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh() {
        let h = harness(100).await;
        let session = h
            .auth
            .login(Credentials::new("a@x.com", "correct-password"), None)
            .await
            .unwrap();

        h.auth.logout(&h.account_id).await.unwrap();
        assert!(
            h.auth
                .refresh(Some(&session.tokens.refresh_token))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_change_password_revokes_and_rehashes() {
        let h = harness(100).await;
        let session = h
            .auth
            .login(Credentials::new("a@x.com", "correct-password"), None)
            .await
            .unwrap();

        h.auth
            .change_password(
                &h.account_id,
                PasswordChange {
                    password: Some("correct-password".to_string()),
                    new_password: Some("brand-new-password".to_string()),
                    confirm_password: Some("brand-new-password".to_string()),
                },
            )
            .await
            .unwrap();

        let stored = h.accounts.find_by_id(&h.account_id).await.unwrap().unwrap();
        assert!(stored.refresh_token_hash.is_none());
        assert!(
            h.tokens
                .verify_refresh(&session.tokens.refresh_token)
                .await
                .is_err()
        );

        assert!(
            h.auth
                .login(Credentials::new("a@x.com", "correct-password"), None)
                .await
                .is_err()
        );
        h.auth
            .login(Credentials::new("a@x.com", "brand-new-password"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_password_rules() {
        let h = harness(100).await;

        let mismatch = h
            .auth
            .change_password(
                &h.account_id,
                PasswordChange {
                    password: Some("correct-password".to_string()),
                    new_password: Some("brand-new-password".to_string()),
                    confirm_password: Some("different-password".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            mismatch,
            Error::Validation(ValidationError::PasswordMismatch)
        ));

        let wrong_current = h
            .auth
            .change_password(
                &h.account_id,
                PasswordChange {
                    password: Some("not-my-password".to_string()),
                    new_password: Some("brand-new-password".to_string()),
                    confirm_password: Some("brand-new-password".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(wrong_current.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_deleted_account() {
        let h = harness(100).await;
        let session = h
            .auth
            .login(Credentials::new("a@x.com", "correct-password"), None)
            .await
            .unwrap();

        h.accounts.delete(&h.account_id).await.unwrap();

        let err = h
            .auth
            .authenticate(&session.tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::AccountMissing)));
    }
}
