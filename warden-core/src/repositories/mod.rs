//! Repository traits for the data access layer
//!
//! # Trait Hierarchy
//!
//! - Individual repository traits define the operations for each data domain:
//!   [`CounterStore`], [`AccountRepository`], [`FileStorage`]
//! - Individual `*Provider` traits give access to each repository type
//! - [`RepositoryProvider`] combines all provider traits plus lifecycle methods
//!
//! [`Repositories`] composes any three backends into one provider, so a
//! deployment can pair a Redis counter store with a SQLite account store.

pub mod account;
pub mod adapter;
pub mod counter;
pub mod file;

pub use account::AccountRepository;
pub use adapter::{AccountRepositoryAdapter, CounterStoreAdapter, FileStorageAdapter};
pub use counter::{CounterState, CounterStore};
pub use file::{FileStorage, StoredFile, Upload};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for account repository access.
pub trait AccountRepositoryProvider: Send + Sync + 'static {
    type AccountRepo: AccountRepository;

    fn account(&self) -> &Self::AccountRepo;
}

/// Provider trait for counter store access.
pub trait CounterStoreProvider: Send + Sync + 'static {
    type CounterRepo: CounterStore;

    fn counter(&self) -> &Self::CounterRepo;
}

/// Provider trait for file storage access.
pub trait FileStorageProvider: Send + Sync + 'static {
    type FileRepo: FileStorage;

    fn files(&self) -> &Self::FileRepo;
}

/// Provider trait that storage backends implement to supply all repositories.
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl AccountRepositoryProvider for MyStorage {
///     type AccountRepo = MyAccountRepository;
///     fn account(&self) -> &Self::AccountRepo { &self.accounts }
/// }
///
/// // ... implement the other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    AccountRepositoryProvider + CounterStoreProvider + FileStorageProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}

/// Composes independent backends into a single [`RepositoryProvider`].
pub struct Repositories<A, C, F> {
    accounts: A,
    counter: C,
    files: F,
}

impl<A, C, F> Repositories<A, C, F>
where
    A: AccountRepository,
    C: CounterStore,
    F: FileStorage,
{
    pub fn new(accounts: A, counter: C, files: F) -> Self {
        Self {
            accounts,
            counter,
            files,
        }
    }
}

impl<A: AccountRepository, C: Send + Sync + 'static, F: Send + Sync + 'static>
    AccountRepositoryProvider for Repositories<A, C, F>
{
    type AccountRepo = A;

    fn account(&self) -> &Self::AccountRepo {
        &self.accounts
    }
}

impl<A: Send + Sync + 'static, C: CounterStore, F: Send + Sync + 'static> CounterStoreProvider
    for Repositories<A, C, F>
{
    type CounterRepo = C;

    fn counter(&self) -> &Self::CounterRepo {
        &self.counter
    }
}

impl<A: Send + Sync + 'static, C: Send + Sync + 'static, F: FileStorage> FileStorageProvider
    for Repositories<A, C, F>
{
    type FileRepo = F;

    fn files(&self) -> &Self::FileRepo {
        &self.files
    }
}

#[async_trait]
impl<A, C, F> RepositoryProvider for Repositories<A, C, F>
where
    A: AccountRepository,
    C: CounterStore,
    F: FileStorage,
{
    async fn migrate(&self) -> Result<(), Error> {
        self.accounts.migrate().await
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.accounts.health_check().await?;
        self.counter.health_check().await
    }
}
