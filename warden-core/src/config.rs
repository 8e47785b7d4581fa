//! Typed configuration
//!
//! Defaults follow the deployed system: a loose global limiter, a strict
//! auth limiter, five failed logins before a fifteen minute lock, and
//! fifteen minute access tokens paired with seven day refresh tokens.

use std::{str::FromStr, time::Duration};

use crate::{error::ValidationError, session::JwtConfig};

/// What a guard does when its counter store cannot be reached in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the request through and log the decision.
    #[default]
    Open,
    /// Reject the request with a dependency error.
    Closed,
}

impl FromStr for FailurePolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            other => Err(ValidationError::InvalidField(format!(
                "failure policy must be `open` or `closed`, got `{other}`"
            ))),
        }
    }
}

/// Configuration of one fixed-window limiter instance
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
    /// Key namespace, keeps limiter instances from sharing quotas
    pub prefix: String,
    /// IPv6 addresses are truncated to this many leading bits
    pub ipv6_prefix_len: u8,
    pub failure_policy: FailurePolicy,
    pub message: String,
}

impl RateLimitConfig {
    /// Loose limiter applied to every route
    pub fn global() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
            prefix: "rl:global:".to_string(),
            ipv6_prefix_len: 56,
            failure_policy: FailurePolicy::Open,
            message: "Too many requests, please try again later.".to_string(),
        }
    }

    /// Strict limiter applied to login and credential fetches
    pub fn auth() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(15 * 60),
            prefix: "rl:auth:".to_string(),
            ipv6_prefix_len: 56,
            failure_policy: FailurePolicy::Open,
            message: "Too many login attempts, please try again after 15 minutes.".to_string(),
        }
    }

    pub fn with_max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// Configuration of the login lockout engine
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub enabled: bool,
    pub max_failed_attempts: u64,
    /// Both the failure streak TTL and the lock TTL
    pub lock_duration: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_attempts: 5,
            lock_duration: Duration::from_secs(15 * 60),
            failure_policy: FailurePolicy::Open,
        }
    }
}

/// Signing keys and lifetimes of both token kinds
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access: JwtConfig,
    pub refresh: JwtConfig,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

impl TokenConfig {
    pub fn new(access: JwtConfig, refresh: JwtConfig) -> Self {
        Self {
            access,
            refresh,
            access_ttl: chrono::Duration::minutes(15),
            refresh_ttl: chrono::Duration::days(7),
        }
    }

    /// HS256 for both kinds with distinct secrets.
    pub fn hs256(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self::new(
            JwtConfig::new_hs256(access_secret.into()),
            JwtConfig::new_hs256(refresh_secret.into()),
        )
    }

    pub fn with_access_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

/// Bounds every call into an external store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub call_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub global_limit: RateLimitConfig,
    pub auth_limit: RateLimitConfig,
    pub lockout: LockoutConfig,
    pub tokens: TokenConfig,
    pub store: StoreConfig,
}

impl WardenConfig {
    /// Defaults for everything but the token keys, which have none.
    pub fn new(tokens: TokenConfig) -> Self {
        Self {
            global_limit: RateLimitConfig::global(),
            auth_limit: RateLimitConfig::auth(),
            lockout: LockoutConfig::default(),
            tokens,
            store: StoreConfig::default(),
        }
    }

    pub fn with_global_limit(mut self, config: RateLimitConfig) -> Self {
        self.global_limit = config;
        self
    }

    pub fn with_auth_limit(mut self, config: RateLimitConfig) -> Self {
        self.auth_limit = config;
        self
    }

    pub fn with_lockout(mut self, config: LockoutConfig) -> Self {
        self.lockout = config;
        self
    }

    pub fn with_store(mut self, config: StoreConfig) -> Self {
        self.store = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_defaults() {
        let global = RateLimitConfig::global();
        let auth = RateLimitConfig::auth();

        assert_eq!(global.max_requests, 100);
        assert_eq!(auth.max_requests, 5);
        assert_eq!(global.window, Duration::from_secs(900));
        assert_ne!(global.prefix, auth.prefix);
    }

    #[test]
    fn test_lockout_defaults() {
        let config = LockoutConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_failed_attempts, 5);
        assert_eq!(config.failure_policy, FailurePolicy::Open);
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("Closed".parse::<FailurePolicy>().unwrap(), FailurePolicy::Closed);
        assert_eq!("open".parse::<FailurePolicy>().unwrap(), FailurePolicy::Open);
        assert!("maybe".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_token_defaults() {
        let tokens = TokenConfig::hs256(b"a".to_vec(), b"b".to_vec());
        assert_eq!(tokens.access_ttl, chrono::Duration::minutes(15));
        assert_eq!(tokens.refresh_ttl, chrono::Duration::days(7));
    }
}
