//! Fixed-window rate limiting over the shared counter store.
//!
//! Each call increments `{prefix}{client key}`; the increment that creates
//! the key also sets its expiry to the window length, so the window starts
//! at the first request and ends when the key expires. Rejected calls still
//! count, which means hammering a closed window never reopens it early.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::{config::RateLimitConfig, services::RateLimiter};
//!
//! let limiter = RateLimiter::new(store, RateLimitConfig::auth(), timeout);
//! let key = limiter.key_for(addr.ip(), None);
//! let decision = limiter.enforce(&key).await?;
//! ```

use std::{
    net::{IpAddr, Ipv6Addr},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::{
    Error,
    account::AccountId,
    config::RateLimitConfig,
    error::RateLimitExceeded,
    repositories::CounterStore,
    services::dependency::{apply_failure_policy, call_store},
};

/// Stable identity of a client for rate limiting purposes.
///
/// Anonymous clients are keyed by network address, with IPv6 collapsed to a
/// routing prefix so rotating through a subnet does not mint fresh quota.
/// Authenticated clients are keyed by address and account together, so a
/// shared NAT does not make unrelated accounts share one budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn from_ip(ip: IpAddr, ipv6_prefix_len: u8) -> Self {
        ClientKey(normalize_ip(ip, ipv6_prefix_len))
    }

    pub fn with_account(self, account_id: &AccountId) -> Self {
        ClientKey(format!("{}:{}", self.0, account_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// IPv4 addresses pass through. IPv6 addresses are masked to
/// `ipv6_prefix_len` bits and rendered in CIDR form; IPv4-mapped IPv6
/// addresses are treated as IPv4.
pub fn normalize_ip(ip: IpAddr, ipv6_prefix_len: u8) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.to_string();
            }
            let bits = u32::from(ipv6_prefix_len.min(128));
            let mask = u128::MAX.checked_shl(128 - bits).unwrap_or(0);
            let network = Ipv6Addr::from(u128::from(v6) & mask);
            format!("{network}/{bits}")
        }
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the current window ends
    pub reset_after: Duration,
    pub reset_at: DateTime<Utc>,
    /// Set when the counter store failed and the limiter failed open
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up.
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    fn rejection(&self, message: &str) -> RateLimitExceeded {
        RateLimitExceeded {
            limit: self.limit,
            remaining: 0,
            retry_after_secs: self.reset_after_secs().max(1),
            reset_at: self.reset_at,
            message: message.to_string(),
        }
    }
}

/// Fixed-window limiter bound to one configuration and key namespace
pub struct RateLimiter<C: CounterStore> {
    store: Arc<C>,
    config: RateLimitConfig,
    call_timeout: Duration,
}

impl<C: CounterStore> RateLimiter<C> {
    pub fn new(store: Arc<C>, config: RateLimitConfig, call_timeout: Duration) -> Self {
        Self {
            store,
            config,
            call_timeout,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Build the client key for a request.
    pub fn key_for(&self, ip: IpAddr, account_id: Option<&AccountId>) -> ClientKey {
        let key = ClientKey::from_ip(ip, self.config.ipv6_prefix_len);
        match account_id {
            Some(id) => key.with_account(id),
            None => key,
        }
    }

    /// Count one request for `key` against the configured limit and window.
    pub async fn check(&self, key: &ClientKey) -> Result<RateLimitDecision, Error> {
        self.check_key(key.as_str(), self.config.max_requests, self.config.window)
            .await
    }

    /// Count one request for an arbitrary key, limit and window.
    ///
    /// The key is placed in this limiter's namespace before it reaches the store.
    pub async fn check_key(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitDecision, Error> {
        let store_key = format!("{}{key}", self.config.prefix);

        let state = match call_store(
            self.call_timeout,
            "rate limiter",
            self.store.increment(&store_key, window),
        )
        .await
        {
            Ok(state) => state,
            Err(e) => {
                let open = RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_after: window,
                    reset_at: Utc::now() + chrono_duration(window),
                    degraded: true,
                };
                return apply_failure_policy(self.config.failure_policy, "rate limiter", e, open);
            }
        };

        let reset_after = state.ttl.unwrap_or(window);
        let decision = RateLimitDecision {
            allowed: state.count <= limit,
            limit,
            remaining: limit.saturating_sub(state.count),
            reset_after,
            reset_at: Utc::now() + chrono_duration(reset_after),
            degraded: false,
        };

        if decision.allowed {
            tracing::debug!(
                key = %store_key,
                count = state.count,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
        } else {
            tracing::warn!(
                key = %store_key,
                count = state.count,
                limit = limit,
                retry_after_secs = decision.reset_after_secs(),
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Like [`check`](Self::check), but turns a rejection into `Error::RateLimited`.
    pub async fn enforce(&self, key: &ClientKey) -> Result<RateLimitDecision, Error> {
        let decision = self.check(key).await?;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(decision.rejection(&self.config.message).into())
        }
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        config::FailurePolicy,
        error::{DependencyError, StorageError},
        repositories::CounterState,
        storage::InMemoryCounterStore,
    };

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn limiter(max: u64, window_secs: u64) -> RateLimiter<InMemoryCounterStore> {
        RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitConfig::auth()
                .with_max_requests(max)
                .with_window(Duration::from_secs(window_secs)),
            TIMEOUT,
        )
    }

    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn increment(&self, _key: &str, _ttl: Duration) -> Result<CounterState, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
        async fn get(&self, _key: &str) -> Result<Option<u64>, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
        async fn set_with_expiry(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
        async fn delete(&self, _key: &str) -> Result<(), Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
        async fn ttl(&self, _key: &str) -> Result<Option<Duration>, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
        async fn health_check(&self) -> Result<(), Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window() {
        let limiter = limiter(5, 60);
        let key = ClientKey::from_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 56);

        for expected in [4, 3, 2, 1, 0] {
            let decision = limiter.check(&key).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }

        let sixth = limiter.check(&key).await.unwrap();
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);

        tokio::time::advance(Duration::from_secs(60)).await;

        let fresh = limiter.check(&key).await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_attempts_do_not_extend_window() {
        let limiter = limiter(1, 60);
        let key = ClientKey::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 56);

        limiter.check(&key).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        let rejected = limiter.check(&key).await.unwrap();
        assert!(!rejected.allowed);
        assert_eq!(rejected.reset_after, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.check(&key).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_enforce_returns_retry_metadata() {
        let limiter = limiter(1, 900);
        let key = ClientKey::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 56);

        limiter.enforce(&key).await.unwrap();
        let err = limiter.enforce(&key).await.unwrap_err();

        match err {
            Error::RateLimited(exceeded) => {
                assert_eq!(exceeded.limit, 1);
                assert_eq!(exceeded.remaining, 0);
                assert!(exceeded.retry_after_secs > 0 && exceeded.retry_after_secs <= 900);
                assert!(exceeded.reset_at > Utc::now());
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_namespaces_are_disjoint() {
        let store = Arc::new(InMemoryCounterStore::new());
        let global = RateLimiter::new(store.clone(), RateLimitConfig::global(), TIMEOUT);
        let auth = RateLimiter::new(
            store.clone(),
            RateLimitConfig::auth().with_max_requests(1),
            TIMEOUT,
        );
        let key = ClientKey::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 56);

        global.check(&key).await.unwrap();
        global.check(&key).await.unwrap();

        assert_eq!(auth.check(&key).await.unwrap().remaining, 0);
        assert_eq!(store.get("rl:global:127.0.0.1").await.unwrap(), Some(2));
        assert_eq!(store.get("rl:auth:127.0.0.1").await.unwrap(), Some(1));
    }

    #[test]
    fn test_ipv6_addresses_collapse_to_prefix() {
        let a: IpAddr = "2001:db8:1:2a3::1".parse().unwrap();
        let b: IpAddr = "2001:db8:1:2ff:ffff::9".parse().unwrap();
        let c: IpAddr = "2001:db8:1:300::1".parse().unwrap();

        assert_eq!(normalize_ip(a, 56), "2001:db8:1:200::/56");
        assert_eq!(normalize_ip(a, 56), normalize_ip(b, 56));
        assert_ne!(normalize_ip(a, 56), normalize_ip(c, 56));
        assert_eq!(normalize_ip(a, 128), "2001:db8:1:2a3::1/128");
        assert_eq!(normalize_ip(a, 0), "::/0");
    }

    #[test]
    fn test_ipv4_mapped_is_plain_ipv4() {
        let mapped: IpAddr = "::ffff:192.0.2.7".parse().unwrap();
        assert_eq!(normalize_ip(mapped, 56), "192.0.2.7");
    }

    #[test]
    fn test_authenticated_key_includes_account() {
        let limiter = limiter(5, 60);
        let id = AccountId::new("acc_abc");
        let key = limiter.key_for(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), Some(&id));
        assert_eq!(key.as_str(), "10.0.0.1:acc_abc");
    }

    #[tokio::test]
    async fn test_store_failure_fails_open_by_default() {
        let limiter = RateLimiter::new(Arc::new(UnreachableStore), RateLimitConfig::global(), TIMEOUT);
        let key = ClientKey::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 56);

        let decision = limiter.enforce(&key).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.degraded);
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed_when_configured() {
        let limiter = RateLimiter::new(
            Arc::new(UnreachableStore),
            RateLimitConfig::global().with_failure_policy(FailurePolicy::Closed),
            TIMEOUT,
        );
        let key = ClientKey::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 56);

        assert!(matches!(
            limiter.check(&key).await,
            Err(Error::Dependency(DependencyError::Unavailable(_, _)))
        ));
    }
}
