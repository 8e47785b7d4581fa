//! Token session manager.
//!
//! Issues and verifies access/refresh pairs. Access tokens are verified
//! statelessly. A refresh token is valid only while its SHA-256 matches the
//! hash stored on the account, which makes every account single-session:
//! a new login supersedes the previous refresh token, and logout or a
//! password change clears it.
//!
//! Rotation swaps the stored hash with a compare-and-swap, so of two
//! concurrent rotations presenting the same refresh token exactly one wins.
//!
//! Revocation cannot recall an access token already handed out; it stays
//! valid until its own short expiry.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error,
    account::{Account, AccountId, AccountProfile},
    config::TokenConfig,
    crypto::{generate_secure_token, hash_token, verify_token_hash},
    error::SessionError,
    repositories::AccountRepository,
    session::{AccessClaims, RefreshClaims, TokenPair},
};

/// Tokens plus the profile of the account they were issued to
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub account: AccountProfile,
    pub tokens: TokenPair,
}

pub struct TokenService<A: AccountRepository> {
    accounts: Arc<A>,
    config: TokenConfig,
}

impl<A: AccountRepository> TokenService<A> {
    pub fn new(accounts: Arc<A>, config: TokenConfig) -> Self {
        Self { accounts, config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Sign a new pair for `account` without persisting anything.
    ///
    /// Returns the pair and the hash of its refresh token.
    pub fn mint(&self, account: &Account) -> Result<(TokenPair, String), Error> {
        let now = Utc::now();
        let access_expires_at = now + self.config.access_ttl;
        let refresh_expires_at = now + self.config.refresh_ttl;

        let access_claims = AccessClaims::for_account(
            account,
            now,
            self.config.access_ttl,
            self.config.access.issuer.clone(),
        );
        let refresh_claims = RefreshClaims {
            sub: account.id.to_string(),
            jti: generate_secure_token(),
            iat: now.timestamp(),
            exp: refresh_expires_at.timestamp(),
            iss: self.config.refresh.issuer.clone(),
        };

        let access_token = self.config.access.sign(&access_claims)?;
        let refresh_token = self.config.refresh.sign(&refresh_claims)?;
        let refresh_hash = hash_token(&refresh_token);

        Ok((
            TokenPair {
                access_token,
                refresh_token,
                access_expires_at,
                refresh_expires_at,
            },
            refresh_hash,
        ))
    }

    /// Issue a pair and make its refresh token the account's only valid one.
    ///
    /// Callers must have cleared lockout and verified credentials first.
    pub async fn issue(&self, account: &Account) -> Result<TokenPair, Error> {
        let (tokens, refresh_hash) = self.mint(account)?;
        self.accounts
            .set_refresh_token_hash(&account.id, Some(&refresh_hash))
            .await?;

        tracing::debug!(account_id = %account.id, "Issued token pair");
        Ok(tokens)
    }

    /// Verify signature and expiry of an access token. Does not touch storage.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, Error> {
        self.config.access.verify(token)
    }

    /// Verify a refresh token, including that it is the account's current one.
    pub async fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, Error> {
        let (claims, _) = self.load_refresh(token).await?;
        Ok(claims)
    }

    async fn load_refresh(&self, token: &str) -> Result<(RefreshClaims, Account), Error> {
        let claims: RefreshClaims = self.config.refresh.verify(token)?;
        let account_id = AccountId::new(&claims.sub);

        let account = self
            .accounts
            .find_by_id(&account_id)
            .await?
            .ok_or(SessionError::Revoked)?;

        let current = account
            .refresh_token_hash
            .as_deref()
            .is_some_and(|stored| verify_token_hash(token, stored));
        if !current {
            tracing::warn!(account_id = %account_id, "Refresh token is not the current session");
            return Err(SessionError::Revoked.into());
        }

        Ok((claims, account))
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// invalid afterwards.
    pub async fn rotate(&self, refresh_token: &str) -> Result<IssuedSession, Error> {
        let (_, account) = self.load_refresh(refresh_token).await?;
        let (tokens, new_hash) = self.mint(&account)?;

        let swapped = self
            .accounts
            .swap_refresh_token_hash(&account.id, &hash_token(refresh_token), Some(&new_hash))
            .await?;
        if !swapped {
            tracing::warn!(
                account_id = %account.id,
                "Refresh token superseded by a concurrent rotation"
            );
            return Err(SessionError::Revoked.into());
        }

        tracing::debug!(account_id = %account.id, "Rotated token pair");
        Ok(IssuedSession {
            account: account.profile(),
            tokens,
        })
    }

    /// Invalidate the account's refresh token.
    pub async fn revoke(&self, account_id: &AccountId) -> Result<(), Error> {
        self.accounts
            .set_refresh_token_hash(account_id, None)
            .await?;
        tracing::debug!(account_id = %account_id, "Revoked refresh token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::{Avatar, NewAccount, Role},
        session::JwtConfig,
        storage::InMemoryAccountRepository,
    };

    async fn setup() -> (TokenService<InMemoryAccountRepository>, Account) {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let account = accounts
            .create(
                NewAccount::builder()
                    .full_name("Ada Lovelace")
                    .email("ada@example.com")
                    .mobile_number("5551234567")
                    .role(Role::Teacher)
                    .password_hash("$argon2id$stub")
                    .avatar(Avatar {
                        id: "avatars/a.png".to_string(),
                        url: "memory://avatars/a.png".to_string(),
                    })
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        let config = TokenConfig::hs256(
            b"access_secret_for_tests_only_0123456789".to_vec(),
            b"refresh_secret_for_tests_only_012345678".to_vec(),
        );
        (TokenService::new(accounts, config), account)
    }

    #[tokio::test]
    async fn test_issue_and_verify_round_trip() {
        let (service, account) = setup().await;
        let tokens = service.issue(&account).await.unwrap();

        let access = service.verify_access(&tokens.access_token).unwrap();
        assert_eq!(access.account_id(), account.id);
        assert_eq!(access.role, Role::Teacher);
        assert_eq!(access.email, "ada@example.com");

        let refresh = service.verify_refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refresh.account_id(), account.id);
    }

    #[tokio::test]
    async fn test_tokens_are_not_interchangeable() {
        let (service, account) = setup().await;
        let tokens = service.issue(&account).await.unwrap();

        assert!(service.verify_access(&tokens.refresh_token).is_err());
        assert!(service.verify_refresh(&tokens.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_is_single_use() {
        let (service, account) = setup().await;
        let tokens = service.issue(&account).await.unwrap();

        let rotated = service.rotate(&tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.tokens.refresh_token, tokens.refresh_token);

        let replay = service.rotate(&tokens.refresh_token).await.unwrap_err();
        assert!(replay.is_auth_error());

        service.rotate(&rotated.tokens.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_login_supersedes_previous_refresh() {
        let (service, account) = setup().await;
        let first = service.issue(&account).await.unwrap();
        let second = service.issue(&account).await.unwrap();

        assert!(matches!(
            service.verify_refresh(&first.refresh_token).await,
            Err(Error::Session(SessionError::Revoked))
        ));
        service.verify_refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_kills_refresh_but_not_access() {
        let (service, account) = setup().await;
        let tokens = service.issue(&account).await.unwrap();

        service.revoke(&account.id).await.unwrap();

        assert!(service.verify_refresh(&tokens.refresh_token).await.is_err());
        // access tokens remain valid until their own expiry
        service.verify_access(&tokens.access_token).unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let (service, account) = setup().await;
        let service = Arc::new(service);
        let tokens = service.issue(&account).await.unwrap();

        let a = {
            let service = service.clone();
            let token = tokens.refresh_token.clone();
            tokio::spawn(async move { service.rotate(&token).await })
        };
        let b = {
            let service = service.clone();
            let token = tokens.refresh_token.clone();
            tokio::spawn(async move { service.rotate(&token).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }

    #[tokio::test]
    async fn test_expired_access_token_rejected() {
        let (service, account) = setup().await;
        let claims = AccessClaims::for_account(
            &account,
            Utc::now() - chrono::Duration::minutes(30),
            chrono::Duration::minutes(15),
            None,
        );
        let token = service.config().access.sign(&claims).unwrap();

        assert!(matches!(
            service.verify_access(&token),
            Err(Error::Session(SessionError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_account_rejected() {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let (service, account) = setup().await;
        let tokens = service.issue(&account).await.unwrap();

        let other = TokenService::new(accounts, service.config().clone());
        assert!(other.verify_refresh(&tokens.refresh_token).await.is_err());

        let wrong_keys = TokenService::new(
            Arc::new(InMemoryAccountRepository::new()),
            TokenConfig::new(
                JwtConfig::new_hs256(b"x".repeat(32)),
                JwtConfig::new_hs256(b"y".repeat(32)),
            ),
        );
        assert!(wrong_keys.verify_access(&tokens.access_token).is_err());
    }
}
