//! Direct datastore access used for data mutation and integrity queries.
//!
//! Everything here bypasses the application under test on purpose.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Datastore error: {0}")]
pub struct DataStoreError(pub String);

impl From<sqlx::Error> for DataStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

/// Raw datastore operations the harness needs.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run a statement, returning rows affected.
    async fn execute(&self, statement: &str) -> Result<u64, DataStoreError>;

    async fn count_rows(&self, table: &str) -> Result<i64, DataStoreError>;

    /// Value of `value_column` for the row whose `key_column` equals `key`.
    async fn lookup(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        key: &str,
    ) -> Result<Option<String>, DataStoreError>;

    /// Set `value_column` for `key`, inserting the row if missing.
    async fn upsert(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DataStoreError>;
}

/// Quote a configured identifier. Only `[A-Za-z0-9_]` is accepted.
pub fn quote_ident(name: &str) -> Result<String, DataStoreError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DataStoreError(format!("invalid identifier {:?}", name)));
    }
    Ok(format!("`{}`", name))
}

/// MySQL-backed datastore.
#[derive(Debug, Clone)]
pub struct SqlDataStore {
    pool: MySqlPool,
}

impl SqlDataStore {
    /// Build a lazily-connecting pool so construction succeeds while the
    /// datastore is down.
    pub fn connect_lazy(options: MySqlConnectOptions) -> Self {
        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options);
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for SqlDataStore {
    async fn execute(&self, statement: &str) -> Result<u64, DataStoreError> {
        let result = sqlx::query(statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&self, table: &str) -> Result<i64, DataStoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn lookup(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        key: &str,
    ) -> Result<Option<String>, DataStoreError> {
        let sql = format!(
            "SELECT CAST({} AS CHAR) FROM {} WHERE {} = ? LIMIT 1",
            quote_ident(value_column)?,
            quote_ident(table)?,
            quote_ident(key_column)?
        );
        let value: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.flatten())
    }

    async fn upsert(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DataStoreError> {
        let value_col = quote_ident(value_column)?;
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?) ON DUPLICATE KEY UPDATE {} = VALUES({})",
            quote_ident(table)?,
            quote_ident(key_column)?,
            value_col,
            value_col,
            value_col
        );
        sqlx::query(&sql).bind(key).bind(value).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("recovery_seed").unwrap(), "`recovery_seed`");
        assert!(quote_ident("").is_err());
        assert!(quote_ident("users; DROP TABLE x").is_err());
        assert!(quote_ident("a`b").is_err());
    }

    #[tokio::test]
    async fn test_lazy_pool_fails_on_use_without_server() {
        let options = MySqlConnectOptions::new().host("127.0.0.1").port(1).database("none");
        let store = SqlDataStore::connect_lazy(options);
        assert_eq!(store.pool().size(), 0);
        assert_err!(store.count_rows("recovery_seed").await);
    }
}
