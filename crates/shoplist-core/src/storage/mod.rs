//! Durable string-keyed storage.
//!
//! This module provides the `KeyValueStore` trait that the cache and the
//! pending-write queue persist through, along with two implementations:
//! - `FileStore`: one JSON file per key in a directory, survives restarts
//! - `MemoryStore`: in-process map, used for ephemeral sessions and tests

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Generic get/set/remove over JSON text values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    async fn keys(&self) -> StorageResult<Vec<String>>;
}
