//! Object storage capability
//!
//! The pipeline only needs `list`, `get` and `put`. [`S3ObjectStore`] backs
//! them with S3 (or any S3-compatible endpoint); [`InMemoryObjectStore`] is the
//! substitute used by tests and dry runs.

use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::pin::Pin;
use tokio::io::{AsyncBufRead, AsyncReadExt};

pub mod config;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Readable body of a stored object
pub type ObjectReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub key: String,
    /// Hex SHA-256 of the uploaded bytes
    pub checksum: String,
    pub size: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Open an object for reading
    async fn get(&self, key: &str) -> Result<ObjectReader>;

    /// Create or replace an object
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<PutResult>;

    /// Read a whole object into memory
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let mut reader = self.get(key).await?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| SyncError::StorageIo(format!("Failed to read {}: {}", key, e)))?;
        Ok(data)
    }
}

/// Serialize `value` as JSON and store it under `key`
pub async fn put_json<T>(store: &dyn ObjectStore, key: &str, value: &T) -> Result<PutResult>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(value)?;
    store.put(key, body, JSON_CONTENT_TYPE).await
}

/// Fetch and deserialize a JSON object
pub async fn get_json<T>(store: &dyn ObjectStore, key: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let data = store.get_bytes(key).await?;
    serde_json::from_slice(&data).map_err(|e| {
        SyncError::StorageIo(format!("Object {} is not valid JSON for its type: {}", key, e))
    })
}

/// Whether an object exists, derived from a listing of its exact key
pub async fn exists(store: &dyn ObjectStore, key: &str) -> Result<bool> {
    Ok(store.list(key).await?.iter().any(|o| o.key == key))
}
