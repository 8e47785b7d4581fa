//! Redis counter store for warden
//!
//! Every server instance pointed at the same Redis shares one view of the
//! rate limit windows and lockout records.
//!
//! # Atomicity
//!
//! `increment` runs as a Lua script: `INCR`, then `PEXPIRE` when the
//! increment created the key (or found one without expiry), then `PTTL`.
//! Redis runs scripts without interleaving, so concurrent first requests
//! cannot each set their own window.
//!
//! ```rust,ignore
//! use warden_storage_redis::RedisCounterStore;
//!
//! let store = RedisCounterStore::connect("redis://127.0.0.1:6379").await?;
//! let state = store.increment("rl:global:203.0.113.7", Duration::from_secs(900)).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use warden_core::{
    Error,
    error::StorageError,
    repositories::{CounterState, CounterStore},
};

const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return { count, redis.call('PTTL', KEYS[1]) }
"#;

/// [`CounterStore`] over a multiplexed Redis connection.
///
/// Cloning is cheap; clones share the underlying connection.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn_manager: ConnectionManager,
    increment: Script,
}

impl RedisCounterStore {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// `StorageError::Connection` if the URL is invalid or the server is unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = Client::open(redis_url).map_err(|e| {
            StorageError::Connection(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StorageError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected to Redis counter store");
        Ok(Self::new(conn_manager))
    }

    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            increment: Script::new(INCREMENT_SCRIPT),
        }
    }
}

fn redis_err(operation: &str) -> impl FnOnce(redis::RedisError) -> Error + '_ {
    move |e| StorageError::Connection(format!("Redis {operation} failed: {e}")).into()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// `PTTL` reports -2 for a missing key and -1 for one without expiry.
fn pttl_to_duration(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<CounterState, Error> {
        let mut conn = self.conn_manager.clone();

        let (count, pttl): (u64, i64) = self
            .increment
            .key(key)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err("INCR"))?;

        Ok(CounterState {
            count,
            ttl: pttl_to_duration(pttl),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, Error> {
        let mut conn = self.conn_manager.clone();
        let value: Option<u64> = conn.get(key).await.map_err(redis_err("GET"))?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: u64, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(redis_err("SET"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await.map_err(redis_err("DEL"))?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error> {
        let mut conn = self.conn_manager.clone();
        let pttl: i64 = conn.pttl(key).await.map_err(redis_err("PTTL"))?;
        Ok(pttl_to_duration(pttl))
    }

    async fn health_check(&self) -> Result<(), Error> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err("PING"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pttl_sentinels_map_to_none() {
        assert_eq!(pttl_to_duration(-2), None);
        assert_eq!(pttl_to_duration(-1), None);
        assert_eq!(pttl_to_duration(1500), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(900)), 900_000);
    }
}
