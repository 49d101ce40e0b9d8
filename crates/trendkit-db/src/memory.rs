//! In-process [`KvStore`] for tests, dry runs and local use.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use trendkit_core::StorageEntry;

use crate::kv::{validate_key, value_size, KvStore, StorageError};

#[derive(Debug, Clone)]
struct Stored {
    value: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    size_bytes: u64,
}

/// `BTreeMap`-backed store. Call [`MemoryKvStore::set_unavailable`] to make
/// every operation fail with [`StorageError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, Stored>>,
    unavailable: AtomicBool,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |m| m.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Stored>>, StorageError> {
        self.check()?;
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.lock()?.get(key).map(|s| s.value.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        validate_key(key)?;
        let now = Utc::now();
        let size_bytes = value_size(&value);
        let mut entries = self.lock()?;
        let created_at = entries.get(key).map_or(now, |s| s.created_at);
        entries.insert(
            key.to_string(),
            Stored {
                value,
                created_at,
                updated_at: now,
                size_bytes,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let entries = self.lock()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, s)| StorageEntry {
                key: k.clone(),
                created_at: s.created_at,
                updated_at: s.updated_at,
                size_bytes: s.size_bytes,
            })
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.contains_key(key))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check()
    }
}
