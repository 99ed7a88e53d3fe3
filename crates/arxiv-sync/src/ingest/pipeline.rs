//! Run sequencing, completion tracking and marker advance
//!
//! ```text
//! INIT -> GATE -> SKIPPED
//!              -> PROCEEDING -> FETCHING -> DEDUPLICATING
//!                 -> (per chunk) TRANSFORMING -> INDEXING
//!                 -> ALL_CHUNKS_DONE -> MARKER_ADVANCED
//! ```
//!
//! The marker is written in exactly one place, [`PipelineOrchestrator::advance_marker`],
//! and only once every chunk listed in the run manifest has a done marker.
//! Any error before that leaves it untouched.

use arxiv_sync_common::{types::RawMetadataRecord, Result, SyncError};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::chunks::{
    done_key, done_prefix, manifest_key, parse_chunk_key, run_prefix, RunManifest,
    StoreChunkSink,
};
use super::dedup::{DedupStats, StreamingDeduplicator};
use super::indexer::BulkIndexer;
use super::transform::transform_batch;
use super::version_gate::{marker_key, GateDecision, VersionGate};
use super::with_timeout;
use crate::config::PipelineConfig;
use crate::queue::{ChunkMessage, ChunkQueue};
use crate::search::SearchIndex;
use crate::source::DatasetSource;
use crate::storage::{exists, get_json, put_json, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Skipped,
    Proceeding,
    Fetching,
    Deduplicating,
    Transforming,
    Indexing,
    AllChunksDone,
    MarkerAdvanced,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "INIT",
            RunState::Skipped => "SKIPPED",
            RunState::Proceeding => "PROCEEDING",
            RunState::Fetching => "FETCHING",
            RunState::Deduplicating => "DEDUPLICATING",
            RunState::Transforming => "TRANSFORMING",
            RunState::Indexing => "INDEXING",
            RunState::AllChunksDone => "ALL_CHUNKS_DONE",
            RunState::MarkerAdvanced => "MARKER_ADVANCED",
        };
        f.write_str(name)
    }
}

fn enter(state: &mut RunState, next: RunState) {
    debug!(from = %state, to = %next, "Run state");
    *state = next;
}

/// Result of processing one chunk; stored as its done marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub key: String,
    pub sequence: u64,
    pub records: usize,
    pub transformed: usize,
    pub validation_errors: usize,
    pub indexed: usize,
    pub index_failed: usize,
    pub processed_at: DateTime<Utc>,
}

/// Stored as the marker object of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub version: i64,
    pub run_prefix: String,
    pub dedup: DedupStats,
    pub chunk_keys: Vec<String>,
    pub records: usize,
    pub transformed: usize,
    pub validation_errors: usize,
    pub indexed: usize,
    pub index_failed: usize,
    pub collected_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn from_reports(manifest: &RunManifest, reports: &[ChunkReport]) -> Self {
        Self {
            version: manifest.version,
            run_prefix: manifest.run_prefix.clone(),
            dedup: manifest.dedup.clone(),
            chunk_keys: manifest.chunks.iter().map(|c| c.key.clone()).collect(),
            records: reports.iter().map(|r| r.records).sum(),
            transformed: reports.iter().map(|r| r.transformed).sum(),
            validation_errors: reports.iter().map(|r| r.validation_errors).sum(),
            indexed: reports.iter().map(|r| r.indexed).sum(),
            index_failed: reports.iter().map(|r| r.index_failed).sum(),
            collected_at: manifest.created_at,
            finished_at: Utc::now(),
        }
    }
}

/// What happened to one chunk message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Processed(ChunkReport),
    /// The chunk belongs to a run older than the stored marker; nothing was indexed
    Stale { version: i64, stored: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// No manifest yet, or some chunks have no done marker
    Pending { done: usize, total: Option<usize> },
    /// This call wrote the marker
    Advanced(RunSummary),
    /// The marker already holds this version
    AlreadyAdvanced,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Skipped(GateDecision),
    /// Chunks written, processing left to queue consumers
    Collected {
        manifest: RunManifest,
        finalize: FinalizeOutcome,
    },
    Completed(RunSummary),
    /// Every chunk was processed but the run could not be finalized
    Incomplete { done: usize, total: Option<usize> },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Skipped(_) => RunState::Skipped,
            RunOutcome::Collected {
                finalize: FinalizeOutcome::Advanced(_) | FinalizeOutcome::AlreadyAdvanced,
                ..
            } => RunState::MarkerAdvanced,
            RunOutcome::Collected { .. } => RunState::Deduplicating,
            RunOutcome::Completed(_) => RunState::MarkerAdvanced,
            RunOutcome::Incomplete { .. } => RunState::Indexing,
        }
    }
}

/// Drives gate, dedup, chunk processing and finalization
pub struct PipelineOrchestrator {
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchIndex>,
    index: String,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        search: Arc<dyn SearchIndex>,
        index: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            search,
            index: index.into(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn gate(&self) -> VersionGate<'_> {
        VersionGate::new(
            self.store.as_ref(),
            &self.config.marker_prefix,
            self.config.marker_selection,
        )
    }

    pub async fn stored_marker(&self) -> Result<i64> {
        with_timeout(
            "marker lookup",
            self.config.external_timeout(),
            self.gate().stored_marker(),
        )
        .await
    }

    /// Gate, then dedup the snapshot into chunk objects and write the manifest
    ///
    /// With a queue attached every chunk is announced as soon as it is stored.
    /// If the manifest for this version already exists the fetch is skipped
    /// and the chunks still lacking a done marker are announced again.
    #[instrument(skip_all, fields(source = %source.describe()))]
    pub async fn collect(
        &self,
        source: &dyn DatasetSource,
        queue: Option<&dyn ChunkQueue>,
    ) -> Result<RunOutcome> {
        let mut state = RunState::Init;
        let timeout = self.config.external_timeout();

        let decision = with_timeout("version check", timeout, self.gate().evaluate(source)).await?;
        let version = match decision {
            GateDecision::Skip { .. } => {
                enter(&mut state, RunState::Skipped);
                return Ok(RunOutcome::Skipped(decision));
            }
            GateDecision::Proceed { source, .. } => source,
        };
        enter(&mut state, RunState::Proceeding);

        let run = run_prefix(version);
        let span = tracing::info_span!("run", version, run = %run);
        self.collect_version(version, &run, source, queue, state)
            .instrument(span)
            .await
    }

    async fn collect_version(
        &self,
        version: i64,
        run: &str,
        source: &dyn DatasetSource,
        queue: Option<&dyn ChunkQueue>,
        mut state: RunState,
    ) -> Result<RunOutcome> {
        let timeout = self.config.external_timeout();

        let manifest = match self.existing_manifest(run).await? {
            Some(manifest) => {
                info!(chunks = manifest.chunks.len(), "Resuming from existing manifest");
                if let Some(queue) = queue {
                    self.republish_pending(&manifest, queue).await?;
                }
                manifest
            }
            None => {
                enter(&mut state, RunState::Fetching);
                let reader = with_timeout("snapshot fetch", timeout, source.fetch_snapshot()).await?;

                enter(&mut state, RunState::Deduplicating);
                let mut sink = StoreChunkSink::new(self.store.as_ref(), version, timeout);
                if let Some(queue) = queue {
                    sink = sink.with_queue(queue);
                }
                let stats = StreamingDeduplicator::new(self.config.dedup_config())
                    .run(reader, &mut sink)
                    .await?;

                let manifest = RunManifest {
                    version,
                    run_prefix: run.to_string(),
                    chunks: sink.into_chunks(),
                    dedup: stats,
                    created_at: Utc::now(),
                };
                with_timeout(
                    "manifest upload",
                    timeout,
                    put_json(self.store.as_ref(), &manifest_key(run), &manifest),
                )
                .await?;
                info!(chunks = manifest.chunks.len(), "Run manifest written");
                manifest
            }
        };

        // Consumers may have finished every chunk before the manifest existed.
        let finalize = self.try_finalize(version).await?;

        Ok(RunOutcome::Collected { manifest, finalize })
    }

    async fn existing_manifest(&self, run: &str) -> Result<Option<RunManifest>> {
        let key = manifest_key(run);
        let timeout = self.config.external_timeout();
        if !with_timeout("manifest lookup", timeout, exists(self.store.as_ref(), &key)).await? {
            return Ok(None);
        }
        with_timeout("manifest read", timeout, get_json(self.store.as_ref(), &key))
            .await
            .map(Some)
    }

    async fn done_sequences(&self, run: &str) -> Result<HashSet<u64>> {
        let objects = with_timeout(
            "done listing",
            self.config.external_timeout(),
            self.store.list(&done_prefix(run)),
        )
        .await?;
        Ok(objects
            .iter()
            .filter_map(|o| parse_chunk_key(&o.key).map(|(_, seq)| seq))
            .collect())
    }

    async fn republish_pending(&self, manifest: &RunManifest, queue: &dyn ChunkQueue) -> Result<()> {
        let done = self.done_sequences(&manifest.run_prefix).await?;
        for chunk in manifest.chunks.iter().filter(|c| !done.contains(&c.sequence)) {
            let message = ChunkMessage {
                version: manifest.version,
                run_prefix: manifest.run_prefix.clone(),
                key: chunk.key.clone(),
                sequence: chunk.sequence,
            };
            with_timeout("chunk publish", self.config.external_timeout(), queue.publish(&message))
                .await?;
        }
        Ok(())
    }

    /// Transform and index one chunk, then record its done marker
    ///
    /// Chunks of a run older than the stored marker are not indexed: their
    /// records would overwrite newer documents. Validation failures and
    /// rejected documents are counted in the report. Storage and search
    /// failures are returned so the chunk can be retried.
    #[instrument(skip_all, fields(key = %message.key))]
    pub async fn process_chunk(&self, message: &ChunkMessage) -> Result<ChunkOutcome> {
        let timeout = self.config.external_timeout();

        let stored = self.stored_marker().await?;
        if message.version < stored {
            warn!(version = message.version, stored, "Skipping chunk of a superseded run");
            return Ok(ChunkOutcome::Stale {
                version: message.version,
                stored,
            });
        }

        let records: Vec<RawMetadataRecord> = with_timeout(
            "chunk download",
            timeout,
            get_json(self.store.as_ref(), &message.key),
        )
        .await?;

        debug!(state = %RunState::Transforming, records = records.len());
        let (documents, failures) = transform_batch(&records);
        for (id, err) in failures.iter().take(self.config.error_log_limit) {
            warn!(id = %id, "Record failed validation: {}", err);
        }

        debug!(state = %RunState::Indexing, documents = documents.len());
        let outcome = BulkIndexer::new(self.search.as_ref(), &self.index, timeout)
            .index(&documents)
            .await?;

        let report = ChunkReport {
            key: message.key.clone(),
            sequence: message.sequence,
            records: records.len(),
            transformed: documents.len(),
            validation_errors: failures.len(),
            indexed: outcome.succeeded,
            index_failed: outcome.failed,
            processed_at: Utc::now(),
        };

        with_timeout(
            "done marker upload",
            timeout,
            put_json(
                self.store.as_ref(),
                &done_key(&message.run_prefix, message.sequence),
                &report,
            ),
        )
        .await?;

        info!(
            records = report.records,
            indexed = report.indexed,
            index_failed = report.index_failed,
            validation_errors = report.validation_errors,
            "Chunk processed"
        );
        Ok(ChunkOutcome::Processed(report))
    }

    /// Advance the marker if every chunk of `version` is done
    #[instrument(skip(self))]
    pub async fn try_finalize(&self, version: i64) -> Result<FinalizeOutcome> {
        let run = run_prefix(version);
        let Some(manifest) = self.existing_manifest(&run).await? else {
            debug!("No manifest yet");
            return Ok(FinalizeOutcome::Pending {
                done: 0,
                total: None,
            });
        };

        let done = self.done_sequences(&run).await?;
        let total = manifest.chunks.len();
        let finished = manifest.sequences().filter(|s| done.contains(s)).count();

        if finished < total {
            debug!(done = finished, total, "Chunks still pending");
            return Ok(FinalizeOutcome::Pending {
                done: finished,
                total: Some(total),
            });
        }
        debug!(state = %RunState::AllChunksDone, total);

        let timeout = self.config.external_timeout();
        let mut reports = Vec::with_capacity(total);
        for sequence in manifest.sequences() {
            let report: ChunkReport = with_timeout(
                "done marker read",
                timeout,
                get_json(self.store.as_ref(), &done_key(&run, sequence)),
            )
            .await?;
            reports.push(report);
        }

        let summary = RunSummary::from_reports(&manifest, &reports);
        if self.advance_marker(&summary).await? {
            Ok(FinalizeOutcome::Advanced(summary))
        } else {
            Ok(FinalizeOutcome::AlreadyAdvanced)
        }
    }

    /// Write the marker for `summary.version`
    ///
    /// Returns `false` when the stored marker already equals the version and
    /// fails with [`SyncError::MarkerRegression`] when it is newer.
    pub async fn advance_marker(&self, summary: &RunSummary) -> Result<bool> {
        let stored = self.stored_marker().await?;

        if stored > summary.version {
            error!(stored, attempted = summary.version, "Refusing to move marker backwards");
            return Err(SyncError::MarkerRegression {
                stored,
                attempted: summary.version,
            });
        }
        if stored == summary.version {
            debug!(version = stored, "Marker already advanced");
            return Ok(false);
        }

        let key = marker_key(&self.config.marker_prefix, summary.version);
        with_timeout(
            "marker upload",
            self.config.external_timeout(),
            put_json(self.store.as_ref(), &key, summary),
        )
        .await?;

        info!(
            marker = %key,
            previous = stored,
            indexed = summary.indexed,
            index_failed = summary.index_failed,
            "Marker advanced"
        );
        Ok(true)
    }

    /// Full in-process run: collect, process every pending chunk, finalize
    #[instrument(skip_all, fields(source = %source.describe()))]
    pub async fn run(&self, source: &dyn DatasetSource) -> Result<RunOutcome> {
        let manifest = match self.collect(source, None).await? {
            RunOutcome::Collected {
                finalize: FinalizeOutcome::Advanced(summary),
                ..
            } => return Ok(RunOutcome::Completed(summary)),
            RunOutcome::Collected { manifest, .. } => manifest,
            other => return Ok(other),
        };

        let done = self.done_sequences(&manifest.run_prefix).await?;
        let pending: Vec<ChunkMessage> = manifest
            .chunks
            .iter()
            .filter(|c| !done.contains(&c.sequence))
            .map(|c| ChunkMessage {
                version: manifest.version,
                run_prefix: manifest.run_prefix.clone(),
                key: c.key.clone(),
                sequence: c.sequence,
            })
            .collect();

        info!(
            pending = pending.len(),
            already_done = done.len(),
            concurrency = self.config.chunk_concurrency,
            "Processing chunks"
        );

        let results: Vec<Result<ChunkOutcome>> = stream::iter(pending.iter())
            .map(|message| self.process_chunk(message))
            .buffer_unordered(self.config.chunk_concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(ChunkOutcome::Processed(_)) => {}
                Ok(ChunkOutcome::Stale { version, stored }) => {
                    error!(version, stored, "A newer run finished first, marker left unchanged");
                    return Err(SyncError::MarkerRegression {
                        stored,
                        attempted: version,
                    });
                }
                Err(err) => {
                    error!("Chunk processing failed, marker left unchanged: {}", err);
                    return Err(err);
                }
            }
        }

        match self.try_finalize(manifest.version).await? {
            FinalizeOutcome::Advanced(summary) => Ok(RunOutcome::Completed(summary)),
            FinalizeOutcome::AlreadyAdvanced => {
                let summary: RunSummary = get_json(
                    self.store.as_ref(),
                    &marker_key(&self.config.marker_prefix, manifest.version),
                )
                .await?;
                Ok(RunOutcome::Completed(summary))
            }
            FinalizeOutcome::Pending { done, total } => {
                warn!(done, ?total, "Run could not be finalized");
                Ok(RunOutcome::Incomplete { done, total })
            }
        }
    }
}
