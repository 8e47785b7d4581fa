//! SQLite account store for warden
//!
//! Holds the durable identity records. Counters for rate limiting and
//! lockout belong in a shared counter store such as `warden-storage-redis`.
//!
//! ```rust,ignore
//! use warden_storage_sqlite::SqliteAccountRepository;
//!
//! let pool = warden_storage_sqlite::connect("sqlite://warden.db").await?;
//! let accounts = SqliteAccountRepository::new(pool);
//! accounts.migrate().await?;
//! ```

mod account;

pub use account::SqliteAccountRepository;

use std::str::FromStr;

use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use warden_core::{Error, error::StorageError};

/// Open a pool for `database_url`, creating the file if it is missing.
pub async fn connect(database_url: &str) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    tracing::info!(database_url = %database_url, "Connected to SQLite");
    Ok(pool)
}
