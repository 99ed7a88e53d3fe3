use arxiv_sync_common::{checksum::sha256_hex, Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

use super::{ObjectInfo, ObjectReader, ObjectStore, PutResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    clock: i64,
    puts: usize,
    fail_puts_matching: Option<String>,
    fail_gets_matching: Option<String>,
}

/// In-memory [`ObjectStore`]
///
/// Every write advances an internal clock by one second so `last_modified`
/// ordering follows write order.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    inner: Mutex<Inner>,
}

fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an object with an explicit modification time
    pub fn insert_with_time(&self, key: &str, data: Vec<u8>, last_modified: DateTime<Utc>) {
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: super::JSON_CONTENT_TYPE.to_string(),
                last_modified,
            },
        );
    }

    /// Make every `put` whose key contains `pattern` fail with a storage error
    pub fn fail_puts_matching(&self, pattern: impl Into<String>) {
        self.lock().fail_puts_matching = Some(pattern.into());
    }

    /// Make every `get` whose key contains `pattern` fail with a storage error
    pub fn fail_gets_matching(&self, pattern: impl Into<String>) {
        self.lock().fail_gets_matching = Some(pattern.into());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.fail_puts_matching = None;
        inner.fail_gets_matching = None;
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.lock().puts
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().objects.get(key).map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let inner = self.lock();
        Ok(inner
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                last_modified: Some(obj.last_modified),
                size: obj.data.len() as i64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<ObjectReader> {
        let inner = self.lock();
        if let Some(pattern) = &inner.fail_gets_matching {
            if key.contains(pattern.as_str()) {
                return Err(SyncError::StorageIo(format!("Injected get failure for {}", key)));
            }
        }
        let obj = inner
            .objects
            .get(key)
            .ok_or_else(|| SyncError::StorageIo(format!("No such key: {}", key)))?;
        Ok(Box::pin(Cursor::new(obj.data.clone())))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<PutResult> {
        let mut inner = self.lock();
        if let Some(pattern) = &inner.fail_puts_matching {
            if key.contains(pattern.as_str()) {
                return Err(SyncError::StorageIo(format!("Injected put failure for {}", key)));
            }
        }

        inner.clock += 1;
        let last_modified = base_time() + Duration::seconds(inner.clock);
        let checksum = sha256_hex(&data);
        let size = data.len() as i64;

        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified,
            },
        );
        inner.puts += 1;

        Ok(PutResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }
}
