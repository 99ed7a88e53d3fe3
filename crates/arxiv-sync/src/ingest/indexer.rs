use arxiv_sync_common::{types::CanonicalDocument, Result};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::with_timeout;
use crate::search::{BulkItem, BulkOutcome, SearchIndex};

/// Upserts canonical documents keyed by `id`, one request per batch
///
/// Rejected documents are counted, never retried. Only a failed request
/// (transport, non-2xx, timeout) is an error.
pub struct BulkIndexer<'a> {
    search: &'a dyn SearchIndex,
    index: &'a str,
    timeout: Duration,
}

impl<'a> BulkIndexer<'a> {
    pub fn new(search: &'a dyn SearchIndex, index: &'a str, timeout: Duration) -> Self {
        Self {
            search,
            index,
            timeout,
        }
    }

    #[instrument(skip_all, fields(index = %self.index, count = documents.len()))]
    pub async fn index(&self, documents: &[CanonicalDocument]) -> Result<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let items = documents
            .iter()
            .map(|doc| -> Result<BulkItem> {
                Ok(BulkItem {
                    id: doc.id.clone(),
                    document: serde_json::to_value(doc)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let outcome = with_timeout(
            "bulk upsert",
            self.timeout,
            self.search.bulk_upsert(self.index, &items),
        )
        .await?;

        if outcome.failed > 0 {
            warn!(succeeded = outcome.succeeded, failed = outcome.failed, "Bulk upsert partially failed");
        } else {
            info!(succeeded = outcome.succeeded, "Bulk upsert finished");
        }

        Ok(outcome)
    }
}
