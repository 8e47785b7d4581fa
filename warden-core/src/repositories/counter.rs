//! Repository trait for the shared atomic counter store.
//!
//! Both the rate limiters and the login lockout engine keep all of their
//! state here. Nothing is cached in process, so every server instance
//! pointed at the same store sees the same counts.

use std::time::Duration;

use async_trait::async_trait;

use crate::Error;

/// Result of an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Value after the increment
    pub count: u64,
    /// Remaining time to live of the key, `None` if the key does not expire
    pub ttl: Option<Duration>,
}

/// Atomic counter and key-value store with per-key expiry.
///
/// # Consistency
///
/// `increment` must be atomic with respect to concurrent callers on every
/// process sharing the store, and must attach `ttl` only on the increment
/// that takes the counter from absent to 1. Two racing first increments
/// therefore cannot produce two different expiry times, and later
/// increments never push the window out.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically increment `key`, creating it with `ttl` if absent.
    ///
    /// # Arguments
    ///
    /// * `key` - The fully namespaced key
    /// * `ttl` - Expiry attached when this call creates the key
    ///
    /// # Returns
    ///
    /// The post-increment count and the key's remaining lifetime.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<CounterState, Error>;

    /// Current value of `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, Error>;

    /// Overwrite `key` with `value`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: u64, ttl: Duration) -> Result<(), Error>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Remaining lifetime of `key`, `None` if absent or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> Result<(), Error>;
}
