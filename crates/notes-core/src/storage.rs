//! Durable key-value storage abstraction.
//!
//! The store persists its whole state as a single record under a fixed key.
//! Writes are whole-value overwrites, so when several tabs share the same
//! storage the last one to persist wins.
//!
//! Implementations:
//! - `InMemoryStorage` - For testing (share it through `Arc` to model two tabs)
//! - `FileStorage` (in notes-tab) - One JSON file per key on the local disk

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable key-value storage.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory storage for testing.
#[derive(Default)]
pub struct InMemoryStorage {
    records: RwLock<HashMap<String, Vec<u8>>>,
    /// Number of successful `set` calls
    writes: RwLock<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `set` has been called. Lets tests assert that no-ops
    /// do not touch storage.
    pub fn write_count(&self) -> usize {
        *self.writes.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a raw record, bypassing the write counter.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_vec());
    }
}

#[async_trait]
impl KeyValueStorage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_vec());
        *self.writes.write().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

// Lets several stores share one backend, like tabs sharing the device's storage.
#[async_trait]
impl<T: KeyValueStorage> KeyValueStorage for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
}
