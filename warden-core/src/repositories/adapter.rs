use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Error,
    account::{Account, AccountId, Avatar, NewAccount},
    repositories::{
        AccountRepository, CounterState, CounterStore, FileStorage, RepositoryProvider,
        StoredFile, Upload,
    },
};

/// Adapter that wraps a RepositoryProvider and implements AccountRepository
pub struct AccountRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AccountRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AccountRepository for AccountRepositoryAdapter<R> {
    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        self.provider.account().create(account).await
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        self.provider.account().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        self.provider.account().find_by_email(email).await
    }

    async fn save_details(&self, account: &Account) -> Result<Account, Error> {
        self.provider.account().save_details(account).await
    }

    async fn set_avatar(&self, id: &AccountId, avatar: &Avatar) -> Result<Account, Error> {
        self.provider.account().set_avatar(id, avatar).await
    }

    async fn set_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error> {
        self.provider.account().set_password_hash(id, password_hash).await
    }

    async fn delete(&self, id: &AccountId) -> Result<(), Error> {
        self.provider.account().delete(id).await
    }

    async fn exists(&self, id: &AccountId) -> Result<bool, Error> {
        self.provider.account().exists(id).await
    }

    async fn list(&self) -> Result<Vec<Account>, Error> {
        self.provider.account().list().await
    }

    async fn set_refresh_token_hash(
        &self,
        id: &AccountId,
        hash: Option<&str>,
    ) -> Result<(), Error> {
        self.provider.account().set_refresh_token_hash(id, hash).await
    }

    async fn swap_refresh_token_hash(
        &self,
        id: &AccountId,
        expected: &str,
        new: Option<&str>,
    ) -> Result<bool, Error> {
        self.provider
            .account()
            .swap_refresh_token_hash(id, expected, new)
            .await
    }

    async fn migrate(&self) -> Result<(), Error> {
        self.provider.account().migrate().await
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.provider.account().health_check().await
    }
}

/// Adapter that wraps a RepositoryProvider and implements CounterStore
pub struct CounterStoreAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> CounterStoreAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> CounterStore for CounterStoreAdapter<R> {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<CounterState, Error> {
        self.provider.counter().increment(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, Error> {
        self.provider.counter().get(key).await
    }

    async fn set_with_expiry(&self, key: &str, value: u64, ttl: Duration) -> Result<(), Error> {
        self.provider.counter().set_with_expiry(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.provider.counter().delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error> {
        self.provider.counter().ttl(key).await
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.provider.counter().health_check().await
    }
}

/// Adapter that wraps a RepositoryProvider and implements FileStorage
pub struct FileStorageAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> FileStorageAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> FileStorage for FileStorageAdapter<R> {
    async fn store(&self, upload: Upload, folder: &str) -> Result<StoredFile, Error> {
        self.provider.files().store(upload, folder).await
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        self.provider.files().remove(id).await
    }
}
