//! Search engine capability
//!
//! Writes are create-or-replace keyed by document id, so replaying a chunk is
//! harmless. Per-document rejections are reported in [`BulkOutcome`]; only a
//! failure of the request itself is an error.

use arxiv_sync_common::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod config;
pub mod mapping;
pub mod memory;
pub mod opensearch;

pub use config::SearchConfig;
pub use mapping::papers_mapping;
pub use memory::InMemorySearchIndex;
pub use opensearch::OpenSearchIndex;

/// One document to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub id: String,
    pub document: Value,
}

/// Per-batch accounting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// `(id, reason)` for rejected documents
    pub failures: Vec<(String, String)>,
}

impl BulkOutcome {
    pub fn record_failure(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push((id.into(), reason.into()));
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upsert every item in a single request
    async fn bulk_upsert(&self, index: &str, items: &[BulkItem]) -> Result<BulkOutcome>;

    /// Create `index` with `mapping`
    ///
    /// An existing index is kept unless `recreate` is set, in which case it is
    /// deleted first. Returns whether the index was created.
    async fn ensure_index(&self, index: &str, mapping: &Value, recreate: bool) -> Result<bool>;
}
