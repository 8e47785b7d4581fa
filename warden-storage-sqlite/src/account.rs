use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use warden_core::{
    Account, AccountId, Avatar, Error, NewAccount, Role,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::AccountRepository,
};

const DUPLICATE_EMAIL_MESSAGE: &str = "Duplicate field value: email";

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteAccount {
    id: String,
    full_name: String,
    email: String,
    mobile_number: String,
    bio: String,
    role: String,
    password_hash: String,
    avatar_id: String,
    avatar_url: String,
    refresh_token_hash: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteAccount> for Account {
    type Error = Error;

    fn try_from(row: SqliteAccount) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| StorageError::Database(format!("Unknown role in row: {}", row.role)))?;

        Ok(Account {
            id: AccountId::new(&row.id),
            full_name: row.full_name,
            email: row.email,
            mobile_number: row.mobile_number,
            bio: row.bio,
            role,
            password_hash: row.password_hash,
            avatar: Avatar {
                id: row.avatar_id,
                url: row.avatar_url,
            },
            refresh_token_hash: row.refresh_token_hash,
            created_at: timestamp(row.created_at)?,
            updated_at: timestamp(row.updated_at)?,
        })
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp: {millis}")).into())
}

/// Map an insert or update failure, recognizing the unique email index.
fn map_write_err(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(DUPLICATE_EMAIL_MESSAGE.to_string()).into()
        }
        _ => StorageError::Database(e.to_string()).into(),
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        let account = account.into_account(Utc::now());

        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            INSERT INTO accounts (id, full_name, email, mobile_number, bio, role, password_hash,
                                  avatar_id, avatar_url, refresh_token_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING *
            "#,
        )
        .bind(account.id.as_str())
        .bind(&account.full_name)
        .bind(&account.email)
        .bind(&account.mobile_number)
        .bind(&account.bio)
        .bind(account.role.as_str())
        .bind(&account.password_hash)
        .bind(&account.avatar.id)
        .bind(&account.avatar.url)
        .bind(&account.refresh_token_hash)
        .bind(account.created_at.timestamp_millis())
        .bind(account.updated_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_err)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>("SELECT * FROM accounts WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_db_err()?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>("SELECT * FROM accounts WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_db_err()?;

        row.map(Account::try_from).transpose()
    }

    async fn save_details(&self, account: &Account) -> Result<Account, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            UPDATE accounts
            SET full_name = ?2, mobile_number = ?3, bio = ?4, role = ?5, updated_at = ?6
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(account.id.as_str())
        .bind(&account.full_name)
        .bind(&account.mobile_number)
        .bind(&account.bio)
        .bind(account.role.as_str())
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.ok_or(StorageError::NotFound)?.try_into()
    }

    async fn set_avatar(&self, id: &AccountId, avatar: &Avatar) -> Result<Account, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            UPDATE accounts
            SET avatar_id = ?2, avatar_url = ?3, updated_at = ?4
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .bind(&avatar.id)
        .bind(&avatar.url)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        row.ok_or(StorageError::NotFound)?.try_into()
    }

    async fn set_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = ?2, refresh_token_hash = NULL, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(password_hash)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_db_err()?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }

    async fn delete(&self, id: &AccountId) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }

    async fn exists(&self, id: &AccountId) -> Result<bool, Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM accounts WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_db_err()?;

        Ok(found.is_some())
    }

    async fn list(&self) -> Result<Vec<Account>, Error> {
        let rows = sqlx::query_as::<_, SqliteAccount>(
            "SELECT * FROM accounts ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_db_err()?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn set_refresh_token_hash(
        &self,
        id: &AccountId,
        hash: Option<&str>,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE accounts SET refresh_token_hash = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(hash)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(())
    }

    async fn swap_refresh_token_hash(
        &self,
        id: &AccountId,
        expected: &str,
        new: Option<&str>,
    ) -> Result<bool, Error> {
        // single conditional UPDATE; SQLite serializes writers
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET refresh_token_hash = ?3, updated_at = ?4
            WHERE id = ?1 AND refresh_token_hash = ?2
            "#,
        )
        .bind(id.as_str())
        .bind(expected)
        .bind(new)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_db_err()?;

        Ok(result.rows_affected() == 1)
    }

    async fn migrate(&self) -> Result<(), Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY NOT NULL,
                full_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                mobile_number TEXT NOT NULL,
                bio TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'student',
                password_hash TEXT NOT NULL,
                avatar_id TEXT NOT NULL,
                avatar_url TEXT NOT NULL,
                refresh_token_hash TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to create accounts table")?;

        tracing::debug!("Accounts schema is up to date");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
