use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::{BulkItem, BulkOutcome, SearchIndex};

#[derive(Debug, Default)]
struct Inner {
    indices: HashMap<String, BTreeMap<String, Value>>,
    mappings: HashMap<String, Value>,
    rejected_ids: HashSet<String>,
    unavailable: bool,
    bulk_calls: usize,
    writes: usize,
}

/// In-memory [`SearchIndex`]
///
/// Upserts replace by id like the real engine. Selected ids can be rejected
/// to exercise partial failures.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    inner: Mutex<Inner>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reject every document with one of these ids
    pub fn reject_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().rejected_ids.extend(ids.into_iter().map(Into::into));
    }

    /// Fail whole requests, as if the engine were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.lock().indices.get(index).and_then(|docs| docs.get(id).cloned())
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.lock().indices.get(index).map_or(0, BTreeMap::len)
    }

    pub fn ids(&self, index: &str) -> Vec<String> {
        self.lock()
            .indices
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.lock().mappings.get(index).cloned()
    }

    pub fn bulk_calls(&self) -> usize {
        self.lock().bulk_calls
    }

    /// Successful document writes, counting replacements
    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn bulk_upsert(&self, index: &str, items: &[BulkItem]) -> Result<BulkOutcome> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(SyncError::Search("in-memory index is unavailable".into()));
        }
        if items.is_empty() {
            return Ok(BulkOutcome::default());
        }
        inner.bulk_calls += 1;

        let mut outcome = BulkOutcome::default();
        for item in items {
            if inner.rejected_ids.contains(&item.id) {
                outcome.record_failure(item.id.clone(), "rejected");
                continue;
            }
            inner
                .indices
                .entry(index.to_string())
                .or_default()
                .insert(item.id.clone(), item.document.clone());
            inner.writes += 1;
            outcome.succeeded += 1;
        }

        Ok(outcome)
    }

    async fn ensure_index(&self, index: &str, mapping: &Value, recreate: bool) -> Result<bool> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(SyncError::Search("in-memory index is unavailable".into()));
        }
        if inner.mappings.contains_key(index) && !recreate {
            return Ok(false);
        }
        inner.indices.insert(index.to_string(), BTreeMap::new());
        inner.mappings.insert(index.to_string(), mapping.clone());
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, n: i64) -> BulkItem {
        BulkItem {
            id: id.into(),
            document: json!({"id": id, "n": n}),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = InMemorySearchIndex::new();
        index.bulk_upsert("p", &[item("a", 1), item("a", 2)]).await.unwrap();
        assert_eq!(index.document_count("p"), 1);
        assert_eq!(index.document("p", "a").unwrap()["n"], 2);
        assert_eq!(index.writes(), 2);
    }

    #[tokio::test]
    async fn test_ensure_index_recreate_clears_documents() {
        let index = InMemorySearchIndex::new();
        assert!(index.ensure_index("p", &json!({}), false).await.unwrap());
        index.bulk_upsert("p", &[item("a", 1)]).await.unwrap();
        assert!(!index.ensure_index("p", &json!({}), false).await.unwrap());
        assert_eq!(index.document_count("p"), 1);
        assert!(index.ensure_index("p", &json!({}), true).await.unwrap());
        assert_eq!(index.document_count("p"), 0);
    }
}
