//! Pluggable backends for the value ledger.
//!
//! Durable and deliberately-broken key-value stores, deterministic settlement
//! simulators for chaos testing, and canned identity providers.

#![deny(unsafe_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use credits_core::{IdentityProvider, KeyValueStore, LedgerError, Settlement, UserProfile};

/// Durable key-value backend: one JSON object per file.
///
/// The stand-in for the browser's per-origin storage. Writes go to a
/// temporary file first and are renamed into place, so a crash mid-write
/// never leaves a half-written store behind.
pub struct JsonFileKvStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the backing file.
    io: Mutex<()>,
}

impl JsonFileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, LedgerError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(LedgerError::StorageUnavailable(err.to_string())),
        }
    }

    async fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LedgerError::StorageUnavailable(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| LedgerError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let _io = self.io.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        let _io = self.io.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        let _io = self.io.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

/// Backend that refuses every operation, as quota-exceeded or disabled
/// storage would. Proves the ledger's fail-silent persistence contract.
#[derive(Debug, Clone, Default)]
pub struct UnavailableKvStore;

#[async_trait]
impl KeyValueStore for UnavailableKvStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, LedgerError> {
        Err(LedgerError::StorageUnavailable("storage disabled".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), LedgerError> {
        Err(LedgerError::StorageUnavailable("storage disabled".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), LedgerError> {
        Err(LedgerError::StorageUnavailable("storage disabled".to_string()))
    }
}

/// Settlement that always refuses, for chaos testing the failure paths.
#[derive(Debug, Clone)]
pub struct AlwaysFailSettlement {
    reason: String,
}

impl AlwaysFailSettlement {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Settlement for AlwaysFailSettlement {
    async fn settle(&self, _reference: &str, _amount: u64) -> Result<(), LedgerError> {
        Err(LedgerError::SettlementFailed(self.reason.clone()))
    }
}

/// Settlement that never confirms, for exercising the defensive timeout.
#[derive(Debug, Clone, Default)]
pub struct NeverSettles;

#[async_trait]
impl Settlement for NeverSettles {
    async fn settle(&self, _reference: &str, _amount: u64) -> Result<(), LedgerError> {
        std::future::pending().await
    }
}

/// Identity provider pinned to one signed-in profile.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    profile: UserProfile,
}

impl FixedIdentity {
    pub fn new(profile: UserProfile) -> Self {
        Self { profile }
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        Some(self.profile.clone())
    }
}

/// Identity provider with nobody signed in.
#[derive(Debug, Clone, Default)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn current_user(&self) -> Option<UserProfile> {
        None
    }
}
