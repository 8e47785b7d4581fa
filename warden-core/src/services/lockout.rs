//! Login lockout engine.
//!
//! Tracks consecutive failed credential checks per login identifier in the
//! shared counter store and converts a long enough streak into a timed lock.
//!
//! # States
//!
//! | State     | Store contents                                | Leaves on                         |
//! | --------- | --------------------------------------------- | --------------------------------- |
//! | `Open`    | nothing                                       | a failure                         |
//! | `Warning` | `login:fail:{id}` in `1..max`, TTL = lock     | TTL expiry, success, `max` reached |
//! | `Locked`  | `login:lock:{id}`, TTL = lock                 | TTL expiry, success               |
//!
//! The failure streak TTL is set on the first failure only, so a streak that
//! stalls is forgiven one lock duration after it started.

use std::{sync::Arc, time::Duration};

use crate::{
    Error,
    config::LockoutConfig,
    repositories::CounterStore,
    services::dependency::{apply_failure_policy, call_store},
    validation::normalize_email,
};

const FAIL_KEY_PREFIX: &str = "login:fail:";
const LOCK_KEY_PREFIX: &str = "login:lock:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    Open,
    Warning,
    Locked,
}

/// Snapshot of one identity's lockout record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutStatus {
    pub state: LockoutState,
    pub failed_attempts: u64,
    /// Remaining lock time while `Locked`
    pub locked_for: Option<Duration>,
}

impl LockoutStatus {
    pub fn is_locked(&self) -> bool {
        self.state == LockoutState::Locked
    }
}

/// Result of recording one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutOutcome {
    /// This failure moved the identity into `Locked`
    pub locked_now: bool,
    /// Failures in the streak including this one
    pub failed_attempts: u64,
}

/// Service implementing the lockout state machine over a [`CounterStore`].
///
/// Holds no state of its own; concurrent failures for one identity are
/// serialized by the store's atomic increment.
pub struct LockoutService<C: CounterStore> {
    store: Arc<C>,
    config: LockoutConfig,
    call_timeout: Duration,
}

impl<C: CounterStore> LockoutService<C> {
    pub fn new(store: Arc<C>, config: LockoutConfig, call_timeout: Duration) -> Self {
        Self {
            store,
            config,
            call_timeout,
        }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check whether `identity` is currently locked.
    ///
    /// Must be called before any credential comparison.
    pub async fn is_locked(&self, identity: &str) -> Result<bool, Error> {
        if !self.config.enabled {
            return Ok(false);
        }

        let key = lock_key(identity);
        match call_store(self.call_timeout, "lockout", self.store.get(&key)).await {
            Ok(flag) => Ok(flag.is_some()),
            Err(e) => apply_failure_policy(self.config.failure_policy, "lockout", e, false),
        }
    }

    /// Record a failed credential check for `identity`.
    ///
    /// When the streak reaches the configured maximum the lock flag is set
    /// and the streak counter removed.
    pub async fn record_failure(&self, identity: &str) -> Result<LockoutOutcome, Error> {
        let unchanged = LockoutOutcome {
            locked_now: false,
            failed_attempts: 0,
        };
        if !self.config.enabled {
            return Ok(unchanged);
        }

        match self.try_record_failure(identity).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => apply_failure_policy(self.config.failure_policy, "lockout", e, unchanged),
        }
    }

    async fn try_record_failure(&self, identity: &str) -> Result<LockoutOutcome, Error> {
        let fail_key = fail_key(identity);
        let state = call_store(
            self.call_timeout,
            "lockout",
            self.store.increment(&fail_key, self.config.lock_duration),
        )
        .await?;

        if state.count < self.config.max_failed_attempts {
            tracing::debug!(
                identity = %normalize_email(identity),
                failed_attempts = state.count,
                "Recorded failed login attempt"
            );
            return Ok(LockoutOutcome {
                locked_now: false,
                failed_attempts: state.count,
            });
        }

        call_store(
            self.call_timeout,
            "lockout",
            self.store
                .set_with_expiry(&lock_key(identity), 1, self.config.lock_duration),
        )
        .await?;
        call_store(self.call_timeout, "lockout", self.store.delete(&fail_key)).await?;

        tracing::warn!(
            identity = %normalize_email(identity),
            failed_attempts = state.count,
            lock_secs = self.config.lock_duration.as_secs(),
            "Account locked after repeated failed logins"
        );

        Ok(LockoutOutcome {
            locked_now: true,
            failed_attempts: state.count,
        })
    }

    /// Forget all failures and any lock for `identity`.
    pub async fn clear(&self, identity: &str) -> Result<(), Error> {
        let result = async {
            call_store(
                self.call_timeout,
                "lockout",
                self.store.delete(&fail_key(identity)),
            )
            .await?;
            call_store(
                self.call_timeout,
                "lockout",
                self.store.delete(&lock_key(identity)),
            )
            .await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => apply_failure_policy(self.config.failure_policy, "lockout", e, ()),
        }
    }

    /// Current state of `identity`'s lockout record.
    pub async fn status(&self, identity: &str) -> Result<LockoutStatus, Error> {
        let locked_for = call_store(
            self.call_timeout,
            "lockout",
            self.store.ttl(&lock_key(identity)),
        )
        .await?;
        let locked = call_store(
            self.call_timeout,
            "lockout",
            self.store.get(&lock_key(identity)),
        )
        .await?
        .is_some();

        if locked {
            return Ok(LockoutStatus {
                state: LockoutState::Locked,
                failed_attempts: self.config.max_failed_attempts,
                locked_for,
            });
        }

        let failed_attempts = call_store(
            self.call_timeout,
            "lockout",
            self.store.get(&fail_key(identity)),
        )
        .await?
        .unwrap_or(0);

        Ok(LockoutStatus {
            state: if failed_attempts == 0 {
                LockoutState::Open
            } else {
                LockoutState::Warning
            },
            failed_attempts,
            locked_for: None,
        })
    }
}

fn fail_key(identity: &str) -> String {
    format!("{FAIL_KEY_PREFIX}{}", normalize_email(identity))
}

fn lock_key(identity: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{}", normalize_email(identity))
}
