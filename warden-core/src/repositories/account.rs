use async_trait::async_trait;

use crate::{
    Error,
    account::{Account, AccountId, Avatar, NewAccount},
};

/// Repository for durable account records
///
/// Emails are stored normalized and must be unique; a duplicate insert
/// fails with `StorageError::Conflict`.
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Insert a new account
    async fn create(&self, account: NewAccount) -> Result<Account, Error>;

    /// Find an account by ID
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error>;

    /// Find an account by its normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;

    /// Persist the editable details of `account`: full name, mobile number,
    /// bio and role.
    ///
    /// The credential hash, the refresh token hash and the avatar are left
    /// untouched; they change only through their dedicated methods, so a
    /// stale copy of the account can never resurrect a revoked session.
    /// Fails with `StorageError::NotFound` if the account no longer exists.
    async fn save_details(&self, account: &Account) -> Result<Account, Error>;

    /// Point the account at a new avatar, `StorageError::NotFound` if absent
    async fn set_avatar(&self, id: &AccountId, avatar: &Avatar) -> Result<Account, Error>;

    /// Replace the credential hash and clear the refresh token hash in one write.
    ///
    /// Fails with `StorageError::NotFound` if the account no longer exists.
    async fn set_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error>;

    /// Delete an account by ID, `StorageError::NotFound` if absent
    async fn delete(&self, id: &AccountId) -> Result<(), Error>;

    /// Whether an account with this ID exists
    async fn exists(&self, id: &AccountId) -> Result<bool, Error>;

    /// All accounts, oldest first
    async fn list(&self) -> Result<Vec<Account>, Error>;

    /// Unconditionally replace the stored refresh token hash
    async fn set_refresh_token_hash(
        &self,
        id: &AccountId,
        hash: Option<&str>,
    ) -> Result<(), Error>;

    /// Replace the stored refresh token hash only if it currently equals `expected`.
    ///
    /// # Returns
    ///
    /// `true` if the swap happened. Of two concurrent swaps from the same
    /// `expected` value at most one returns `true`.
    async fn swap_refresh_token_hash(
        &self,
        id: &AccountId,
        expected: &str,
        new: Option<&str>,
    ) -> Result<bool, Error>;

    /// Create or upgrade the backing schema
    async fn migrate(&self) -> Result<(), Error>;

    /// Verify the backing store is reachable
    async fn health_check(&self) -> Result<(), Error>;
}
