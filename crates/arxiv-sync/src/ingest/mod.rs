//! Version-gated synchronization pipeline
//!
//! Stages, in order:
//!
//! 1. [`version_gate`]: compare the upstream version with the stored marker
//! 2. [`dedup`]: stream the snapshot once, collapse superseded records and
//!    flush fixed-size chunks through a [`dedup::ChunkSink`]
//! 3. [`chunks`]: chunk objects, run manifest and done markers in the store
//! 4. [`transform`] + [`indexer`]: per chunk, normalize and bulk upsert
//! 5. [`pipeline`]: sequencing, completion tracking and marker advance
//!
//! [`consumer`] drives stage 4 from the chunk queue.

use arxiv_sync_common::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

pub mod chunks;
pub mod consumer;
pub mod dedup;
pub mod indexer;
pub mod pipeline;
pub mod transform;
pub mod version_gate;

pub use chunks::{ChunkRef, RunManifest, StoreChunkSink};
pub use consumer::{ChunkConsumer, DrainReport};
pub use dedup::{ChunkSink, DedupConfig, DedupState, DedupStats, StreamingDeduplicator};
pub use indexer::BulkIndexer;
pub use pipeline::{
    ChunkOutcome, ChunkReport, FinalizeOutcome, PipelineOrchestrator, RunOutcome, RunState, RunSummary,
};
pub use transform::{extract_authors, extract_categories, extract_versions, transform_record};
pub use version_gate::{GateDecision, MarkerSelection, SkipReason, VersionGate};

/// Bound an external call, mapping expiry to [`SyncError::Timeout`]
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::timeout(operation, limit.as_secs())),
    }
}
