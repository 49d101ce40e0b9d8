//! Postgres-backed [`KvStore`] over the `kv_entries` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use trendkit_core::StorageEntry;

use crate::kv::{validate_key, value_size, KvStore, StorageError};

/// A metadata row from `kv_entries` (value omitted).
#[derive(Debug, Clone, sqlx::FromRow)]
struct EntryRow {
    key: String,
    size_bytes: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EntryRow> for StorageEntry {
    fn from(row: EntryRow) -> Self {
        StorageEntry {
            key: row.key,
            created_at: row.created_at,
            updated_at: row.updated_at,
            size_bytes: u64::try_from(row.size_bytes).unwrap_or(0),
        }
    }
}

/// `LIKE` pattern matching keys that start with `prefix`, with `\`, `%` and
/// `_` escaped so they match literally.
fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[derive(Debug, Clone)]
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let value = sqlx::query_scalar::<_, Value>("SELECT value FROM kv_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        validate_key(key)?;
        let size_bytes = i64::try_from(value_size(&value)).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO kv_entries (key, value, size_bytes) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, \
                 size_bytes = EXCLUDED.size_bytes, \
                 updated_at = NOW()",
        )
        .bind(key)
        .bind(&value)
        .bind(size_bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT key, size_bytes, created_at, updated_at \
             FROM kv_entries \
             WHERE key LIKE $1 ESCAPE '\\' \
             ORDER BY key",
        )
        .bind(like_prefix_pattern(prefix))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StorageEntry::from).collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM kv_entries WHERE key = $1)",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        crate::ping(&self.pool).await?;
        Ok(())
    }
}
