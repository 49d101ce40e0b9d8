//! Backend contract for JSON key/value persistence.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use trendkit_core::StorageEntry;

use crate::DbError;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached (connection refused, pool closed, outage).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to serialize value for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value no longer matches the expected shape.
    #[error("stored value at {key} is unreadable: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid storage key \"{0}\"")]
    InvalidKey(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Unavailable(e.to_string())
            }
            other => StorageError::Db(DbError::Sqlx(other)),
        }
    }
}

/// Minimal JSON key/value store.
///
/// Keys are opaque strings; namespacing is the caller's job.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace `key`. `created_at` is preserved on replace.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Metadata for every key starting with `prefix`, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend is unreachable.
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Serialized size used for [`StorageEntry::size_bytes`].
pub(crate) fn value_size(value: &Value) -> u64 {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len() as u64)
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.trim().is_empty() || key.chars().any(char::is_whitespace) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
