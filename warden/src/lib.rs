//! # Warden
//!
//! Warden guards the login surface of an HTTP API. It bundles:
//! - a fixed-window rate limiter with separate global and auth quotas
//! - a login lockout engine that turns repeated failures into a timed lock
//! - access/refresh token sessions with single-use refresh rotation
//! - the account lifecycle around them (signup, profile, avatar, deletion)
//!
//! All counters live in a shared [`CounterStore`](warden_core::repositories::CounterStore),
//! so several server processes pointed at one Redis enforce one set of limits.
//!
//! ## Storage Support
//!
//! - SQLite for accounts (`sqlite` feature)
//! - Redis for counters (`redis` feature)
//! - In-memory backends for tests and single-process deployments
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use warden::{Warden, WardenConfig, TokenConfig};
//! use warden_core::storage::InMemoryRepositories;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WardenConfig::new(TokenConfig::hs256(
//!         b"access-secret-at-least-32-bytes-long!".to_vec(),
//!         b"refresh-secret-at-least-32-bytes-long".to_vec(),
//!     ));
//!     let warden = Warden::new(Arc::new(InMemoryRepositories::in_memory()), config);
//!     warden.migrate().await?;
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use warden_core::{
    AccessClaims, AccountId, AccountProfile, Error,
    repositories::{
        AccountRepositoryAdapter, CounterStoreAdapter, FileStorageAdapter, RepositoryProvider,
        Upload,
    },
    services::{
        AccountService, AuthService, ClientKey, Credentials, DetailsUpdate, IssuedSession,
        LockoutService, PasswordChange, RateLimiter, Signup, TokenService,
    },
    storage::InMemoryRepositories,
};

/// Re-export core types from warden_core
///
/// These types are commonly used when working with the Warden API.
pub use warden_core::{
    Account, FailurePolicy, JwtConfig, LockoutConfig, RateLimitConfig, Role, StoreConfig,
    TokenConfig, TokenPair, WardenConfig,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use warden_storage_sqlite::{SqliteAccountRepository, connect as connect_sqlite};

#[cfg(feature = "redis")]
pub use warden_storage_redis::RedisCounterStore;

pub type AccountRepo<R> = AccountRepositoryAdapter<R>;
pub type CounterRepo<R> = CounterStoreAdapter<R>;
pub type FileRepo<R> = FileStorageAdapter<R>;

/// The main coordinator that owns every service and the storage they share.
///
/// Both limiters and the lockout engine receive the same counter store, so
/// one deployment has exactly one source of truth for counts.
pub struct Warden<R: RepositoryProvider> {
    repositories: Arc<R>,
    config: WardenConfig,
    global_limiter: Arc<RateLimiter<CounterRepo<R>>>,
    auth_limiter: Arc<RateLimiter<CounterRepo<R>>>,
    lockout: Arc<LockoutService<CounterRepo<R>>>,
    tokens: Arc<TokenService<AccountRepo<R>>>,
    auth: Arc<AuthService<AccountRepo<R>, CounterRepo<R>>>,
    accounts: Arc<AccountService<AccountRepo<R>, FileRepo<R>>>,
}

impl<R: RepositoryProvider> Warden<R> {
    /// Create a new Warden instance with a repository provider
    ///
    /// # Arguments
    ///
    /// * `repositories` - The repository provider implementation
    /// * `config` - Limits, lockout policy, token keys and store timeouts
    pub fn new(repositories: Arc<R>, config: WardenConfig) -> Self {
        let account_repo = Arc::new(AccountRepositoryAdapter::new(repositories.clone()));
        let counter = Arc::new(CounterStoreAdapter::new(repositories.clone()));
        let files = Arc::new(FileStorageAdapter::new(repositories.clone()));
        let call_timeout = config.store.call_timeout;

        let global_limiter = Arc::new(RateLimiter::new(
            counter.clone(),
            config.global_limit.clone(),
            call_timeout,
        ));
        let auth_limiter = Arc::new(RateLimiter::new(
            counter.clone(),
            config.auth_limit.clone(),
            call_timeout,
        ));
        let lockout = Arc::new(LockoutService::new(
            counter,
            config.lockout.clone(),
            call_timeout,
        ));
        let tokens = Arc::new(TokenService::new(
            account_repo.clone(),
            config.tokens.clone(),
        ));
        let auth = Arc::new(AuthService::new(
            account_repo.clone(),
            tokens.clone(),
            lockout.clone(),
            auth_limiter.clone(),
        ));
        let accounts = Arc::new(AccountService::new(account_repo, files));

        tracing::debug!(
            global_max = config.global_limit.max_requests,
            auth_max = config.auth_limit.max_requests,
            lockout_max = config.lockout.max_failed_attempts,
            "Warden services initialized"
        );

        Self {
            repositories,
            config,
            global_limiter,
            auth_limiter,
            lockout,
            tokens,
            auth,
            accounts,
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    pub fn global_limiter(&self) -> &Arc<RateLimiter<CounterRepo<R>>> {
        &self.global_limiter
    }

    pub fn auth_limiter(&self) -> &Arc<RateLimiter<CounterRepo<R>>> {
        &self.auth_limiter
    }

    pub fn lockout(&self) -> &Arc<LockoutService<CounterRepo<R>>> {
        &self.lockout
    }

    pub fn tokens(&self) -> &Arc<TokenService<AccountRepo<R>>> {
        &self.tokens
    }

    pub fn auth(&self) -> &Arc<AuthService<AccountRepo<R>, CounterRepo<R>>> {
        &self.auth
    }

    pub fn accounts(&self) -> &Arc<AccountService<AccountRepo<R>, FileRepo<R>>> {
        &self.accounts
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    /// Register an account
    pub async fn signup(
        &self,
        form: Signup,
        avatar: Option<Upload>,
    ) -> Result<AccountProfile, Error> {
        self.accounts.signup(form, avatar).await
    }

    /// Log in with email and password
    ///
    /// # Arguments
    ///
    /// * `credentials` - Email and password as submitted
    /// * `client` - Key charged against the auth rate limiter, if not already charged
    ///
    /// # Returns
    ///
    /// The account profile and a fresh token pair
    pub async fn login(
        &self,
        credentials: Credentials,
        client: Option<&ClientKey>,
    ) -> Result<IssuedSession, Error> {
        self.auth.login(credentials, client).await
    }

    /// Verify an access token and that its account still exists
    pub async fn authenticate(&self, access_token: &str) -> Result<AccessClaims, Error> {
        self.auth.authenticate(access_token).await
    }

    pub async fn logout(&self, account_id: &AccountId) -> Result<(), Error> {
        self.auth.logout(account_id).await
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<IssuedSession, Error> {
        self.auth.refresh(refresh_token).await
    }

    pub async fn change_password(
        &self,
        account_id: &AccountId,
        change: PasswordChange,
    ) -> Result<(), Error> {
        self.auth.change_password(account_id, change).await
    }

    pub async fn profile(&self, account_id: &AccountId) -> Result<AccountProfile, Error> {
        self.accounts.profile(account_id).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<AccountProfile>, Error> {
        self.accounts.list_profiles().await
    }

    pub async fn update_details(
        &self,
        account_id: &AccountId,
        update: DetailsUpdate,
    ) -> Result<AccountProfile, Error> {
        self.accounts.update_details(account_id, update).await
    }

    pub async fn update_avatar(
        &self,
        account_id: &AccountId,
        upload: Option<Upload>,
    ) -> Result<AccountProfile, Error> {
        self.accounts.update_avatar(account_id, upload).await
    }

    pub async fn delete_account(&self, actor_id: &AccountId, target_id: &str) -> Result<(), Error> {
        self.accounts.delete_account(actor_id, target_id).await
    }
}

impl Warden<InMemoryRepositories> {
    /// Warden over in-process storage only.
    ///
    /// Counts are not shared between processes; use a shared counter store
    /// when running more than one instance.
    pub fn in_memory(config: WardenConfig) -> Self {
        Self::new(Arc::new(InMemoryRepositories::in_memory()), config)
    }
}
