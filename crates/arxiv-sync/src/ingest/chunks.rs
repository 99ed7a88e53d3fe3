//! Chunk objects and run bookkeeping in the object store
//!
//! Layout of one run, where `{run}` is `parsed_{version}`:
//!
//! ```text
//! {run}/metadata-{sequence}.json        JSON array of raw records
//! {run}/manifest.json                   RunManifest, written after dedup
//! {run}/done/metadata-{sequence}.json   ChunkReport, written once indexed
//! ```
//!
//! Every key is derived from the version and the cumulative record count, so
//! a re-run of the same version lands on the same keys.

use arxiv_sync_common::{types::RawMetadataRecord, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::dedup::{ChunkSink, DedupStats};
use super::with_timeout;
use crate::queue::{ChunkMessage, ChunkQueue};
use crate::storage::{put_json, ObjectStore};

const RUN_PREFIX_HEAD: &str = "parsed_";
const CHUNK_HEAD: &str = "metadata-";

pub fn run_prefix(version: i64) -> String {
    format!("{}{}", RUN_PREFIX_HEAD, version)
}

pub fn parse_run_prefix(prefix: &str) -> Option<i64> {
    prefix.strip_prefix(RUN_PREFIX_HEAD)?.parse().ok()
}

pub fn chunk_key(run_prefix: &str, sequence: u64) -> String {
    format!("{}/{}{}.json", run_prefix, CHUNK_HEAD, sequence)
}

/// Split a chunk key into its run prefix and sequence
pub fn parse_chunk_key(key: &str) -> Option<(&str, u64)> {
    let (run, file) = key.rsplit_once('/')?;
    let sequence = file.strip_prefix(CHUNK_HEAD)?.strip_suffix(".json")?.parse().ok()?;
    Some((run, sequence))
}

pub fn manifest_key(run_prefix: &str) -> String {
    format!("{}/manifest.json", run_prefix)
}

pub fn done_prefix(run_prefix: &str) -> String {
    format!("{}/done/", run_prefix)
}

pub fn done_key(run_prefix: &str, sequence: u64) -> String {
    format!("{}{}{}.json", done_prefix(run_prefix), CHUNK_HEAD, sequence)
}

/// One written chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub key: String,
    pub sequence: u64,
    pub records: usize,
    /// SHA-256 of the chunk object
    pub checksum: String,
}

/// Everything the completion check needs to know about a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: i64,
    pub run_prefix: String,
    pub chunks: Vec<ChunkRef>,
    pub dedup: DedupStats,
    pub created_at: DateTime<Utc>,
}

impl RunManifest {
    pub fn sequences(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks.iter().map(|c| c.sequence)
    }
}

/// Writes each batch as a chunk object and, when a queue is attached,
/// announces it
pub struct StoreChunkSink<'a> {
    store: &'a dyn ObjectStore,
    queue: Option<&'a dyn ChunkQueue>,
    version: i64,
    run_prefix: String,
    timeout: Duration,
    written: Vec<ChunkRef>,
}

impl<'a> StoreChunkSink<'a> {
    pub fn new(store: &'a dyn ObjectStore, version: i64, timeout: Duration) -> Self {
        Self {
            store,
            queue: None,
            version,
            run_prefix: run_prefix(version),
            timeout,
            written: Vec::new(),
        }
    }

    pub fn with_queue(mut self, queue: &'a dyn ChunkQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn run_prefix(&self) -> &str {
        &self.run_prefix
    }

    pub fn into_chunks(self) -> Vec<ChunkRef> {
        self.written
    }
}

#[async_trait]
impl ChunkSink for StoreChunkSink<'_> {
    async fn flush(&mut self, sequence: u64, records: Vec<RawMetadataRecord>) -> Result<()> {
        let key = chunk_key(&self.run_prefix, sequence);
        let count = records.len();

        let put = with_timeout(
            "chunk upload",
            self.timeout,
            put_json(self.store, &key, &records),
        )
        .await?;
        debug!(key = %key, checksum = %put.checksum, bytes = put.size, "Chunk stored");

        if let Some(queue) = self.queue {
            let message = ChunkMessage {
                version: self.version,
                run_prefix: self.run_prefix.clone(),
                key: key.clone(),
                sequence,
            };
            with_timeout("chunk publish", self.timeout, queue.publish(&message)).await?;
            info!(key = %key, "Chunk announced");
        }

        self.written.push(ChunkRef {
            key,
            sequence,
            records: count,
            checksum: put.checksum,
        });
        Ok(())
    }
}
