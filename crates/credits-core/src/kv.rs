//! Persistent key-value adapter.
//!
//! Wraps whatever durable per-session storage is available behind a narrow
//! get/set/remove seam. Persistence is a best-effort cache of authoritative
//! in-memory ledger state; backends signal `StorageUnavailable` and the
//! ledger store decides how to react (it logs and carries on).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::LedgerError;
use crate::types::Resource;

/// Key for a resource's persisted balance, namespaced per user.
pub fn balance_key(resource: Resource, user_id: &str) -> String {
    format!("balance:{}:{}", resource.label(), user_id)
}

/// Key for a resource's persisted history, namespaced per user.
pub fn history_key(resource: Resource, user_id: &str) -> String {
    format!("history:{}:{}", resource.label(), user_id)
}

/// Trait for durable key-value backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value. `None` means the key was never written (or was removed).
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), LedgerError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), LedgerError>;

    /// Check whether a key holds a value.
    async fn contains(&self, key: &str) -> Result<bool, LedgerError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// In-process backend. Keeps all entries in memory only.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
