//! In-memory backends
//!
//! Suitable for tests and single-process deployments. Expiry is measured on
//! `tokio::time::Instant`, so tests can drive windows and locks forward with
//! a paused clock.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    Error,
    account::{Account, AccountId, Avatar, NewAccount},
    error::StorageError,
    id::generate_prefixed_id,
    repositories::{
        AccountRepository, CounterState, CounterStore, FileStorage, Repositories, StoredFile,
        Upload,
    },
};

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

/// DashMap-backed [`CounterStore`]
///
/// Increments hold the shard lock for the key, which gives the same
/// guarantee as an atomic increment in a networked store.
///
/// Expired keys read as absent but stay resident until swept, either by
/// [`purge_expired`](Self::purge_expired) or by the task started with
/// [`spawn_purge`](Self::spawn_purge).
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: Arc<DashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key.
    pub fn purge_expired(&self) {
        purge(&self.entries);
    }

    /// Sweep expired keys every `every` on a background task.
    ///
    /// The task holds only a weak reference and exits once the store is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_purge(&self, every: Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                purge(&entries);
            }
            tracing::debug!("counter purge task stopped");
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn purge(entries: &DashMap<String, CounterEntry>) {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    let purged = before.saturating_sub(entries.len());
    if purged > 0 {
        tracing::debug!(purged, "purged expired counters");
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<CounterState, Error> {
        let now = Instant::now();
        let fresh = CounterEntry {
            value: 1,
            expires_at: Some(now + ttl),
        };

        let entry = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    occupied.get_mut().value += 1;
                } else {
                    occupied.insert(fresh);
                }
                *occupied.get()
            }
            Entry::Vacant(vacant) => *vacant.insert(fresh),
        };

        Ok(CounterState {
            count: entry.value,
            ttl: entry.remaining(now),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, Error> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn set_with_expiry(&self, key: &str, value: u64, ttl: Duration) -> Result<(), Error> {
        self.entries.insert(
            key.to_string(),
            CounterEntry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.remaining(now)))
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// DashMap-backed [`AccountRepository`] with a unique email index
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    accounts: DashMap<AccountId, Account>,
    emails: DashMap<String, AccountId>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        match self.emails.entry(account.email.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(
                "Duplicate field value: email".to_string(),
            )
            .into()),
            Entry::Vacant(vacant) => {
                let account = account.into_account(Utc::now());
                vacant.insert(account.id.clone());
                self.accounts.insert(account.id.clone(), account.clone());
                Ok(account)
            }
        }
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        Ok(self.accounts.get(id).map(|account| account.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let Some(id) = self.emails.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn save_details(&self, account: &Account) -> Result<Account, Error> {
        let mut stored = self
            .accounts
            .get_mut(&account.id)
            .ok_or(StorageError::NotFound)?;

        stored.full_name = account.full_name.clone();
        stored.mobile_number = account.mobile_number.clone();
        stored.bio = account.bio.clone();
        stored.role = account.role;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn set_avatar(&self, id: &AccountId, avatar: &Avatar) -> Result<Account, Error> {
        let mut stored = self.accounts.get_mut(id).ok_or(StorageError::NotFound)?;
        stored.avatar = avatar.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn set_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error> {
        let mut stored = self.accounts.get_mut(id).ok_or(StorageError::NotFound)?;
        stored.password_hash = password_hash.to_string();
        stored.refresh_token_hash = None;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &AccountId) -> Result<(), Error> {
        let (_, account) = self.accounts.remove(id).ok_or(StorageError::NotFound)?;
        self.emails.remove(&account.email);
        Ok(())
    }

    async fn exists(&self, id: &AccountId) -> Result<bool, Error> {
        Ok(self.accounts.contains_key(id))
    }

    async fn list(&self) -> Result<Vec<Account>, Error> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(accounts)
    }

    async fn set_refresh_token_hash(
        &self,
        id: &AccountId,
        hash: Option<&str>,
    ) -> Result<(), Error> {
        let mut stored = self.accounts.get_mut(id).ok_or(StorageError::NotFound)?;
        stored.refresh_token_hash = hash.map(str::to_string);
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn swap_refresh_token_hash(
        &self,
        id: &AccountId,
        expected: &str,
        new: Option<&str>,
    ) -> Result<bool, Error> {
        let Some(mut stored) = self.accounts.get_mut(id) else {
            return Ok(false);
        };

        if stored.refresh_token_hash.as_deref() != Some(expected) {
            return Ok(false);
        }

        stored.refresh_token_hash = new.map(str::to_string);
        stored.updated_at = Utc::now();
        Ok(true)
    }

    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// DashMap-backed [`FileStorage`] that keeps uploads in memory
#[derive(Debug, Default)]
pub struct InMemoryFileStorage {
    files: DashMap<String, Upload>,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn store(&self, upload: Upload, folder: &str) -> Result<StoredFile, Error> {
        let id = format!(
            "{folder}/{}.{}",
            generate_prefixed_id("file"),
            upload.extension()
        );
        let url = format!("memory://{id}");
        self.files.insert(id.clone(), upload);
        Ok(StoredFile { id, url })
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        self.files.remove(id);
        Ok(())
    }
}

/// All-in-memory provider
pub type InMemoryRepositories =
    Repositories<InMemoryAccountRepository, InMemoryCounterStore, InMemoryFileStorage>;

impl InMemoryRepositories {
    pub fn in_memory() -> Self {
        Repositories::new(
            InMemoryAccountRepository::new(),
            InMemoryCounterStore::new(),
            InMemoryFileStorage::new(),
        )
    }
}
