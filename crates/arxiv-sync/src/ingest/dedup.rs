//! Bounded-memory streaming deduplication
//!
//! The snapshot is read exactly once. Only `id -> best timestamp` is kept for
//! the whole pass; record bodies live in the current batch until it is flushed
//! to a [`ChunkSink`]. A record is dropped only when a strictly newer version
//! of the same id was already seen. Older-or-equal predecessors already
//! flushed are overwritten later by the index's upsert-by-id, so the index
//! converges on the newest record with ties going to the last one in the file.

use arxiv_sync_common::{time::parse_update_date, types::RawMetadataRecord, Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, instrument};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_ERROR_LOG_LIMIT: usize = 10;
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Accepted records per chunk
    pub chunk_size: usize,
    /// Stop after this many accepted records
    pub max_records: Option<usize>,
    /// Malformed lines logged in detail; the rest are only counted
    pub error_log_limit: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_records: None,
            error_log_limit: DEFAULT_ERROR_LOG_LIMIT,
        }
    }
}

/// Receives each full batch as it is cut
#[async_trait]
pub trait ChunkSink: Send {
    /// `sequence` is the cumulative number of accepted records up to and
    /// including this batch.
    async fn flush(&mut self, sequence: u64, records: Vec<RawMetadataRecord>) -> Result<()>;
}

/// Outcome of offering a record to [`DedupState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    New,
    /// Seen before with an older or equal timestamp
    Replaced,
    /// Seen before with a strictly newer timestamp
    Superseded,
}

impl Admission {
    pub fn accepted(self) -> bool {
        !matches!(self, Admission::Superseded)
    }
}

/// Best timestamp seen per id within one pass
#[derive(Debug, Default)]
pub struct DedupState {
    best: HashMap<String, i64>,
}

impl DedupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, id: &str, timestamp: i64) -> Admission {
        match self.best.get_mut(id) {
            None => {
                self.best.insert(id.to_string(), timestamp);
                Admission::New
            }
            Some(stored) if timestamp >= *stored => {
                *stored = timestamp;
                Admission::Replaced
            }
            Some(_) => Admission::Superseded,
        }
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub accepted: u64,
    /// Accepted records whose id had been accepted before
    pub replaced: u64,
    pub superseded: u64,
    /// Lines that were not valid UTF-8 JSON records
    pub parse_errors: u64,
    /// Records without a usable `update_date`
    pub version_errors: u64,
    pub unique_ids: u64,
    pub chunks_flushed: u64,
    /// Reading stopped at `max_records`
    pub capped: bool,
}

impl DedupStats {
    pub fn error_count(&self) -> u64 {
        self.parse_errors + self.version_errors
    }
}

fn preview(line: &[u8]) -> String {
    String::from_utf8_lossy(line).chars().take(PREVIEW_CHARS).collect()
}

/// Single-pass deduplicator feeding a [`ChunkSink`]
pub struct StreamingDeduplicator {
    config: DedupConfig,
    state: DedupState,
    stats: DedupStats,
    batch: Vec<RawMetadataRecord>,
}

impl StreamingDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        let capacity = config.chunk_size.max(1);
        Self {
            config,
            state: DedupState::new(),
            stats: DedupStats::default(),
            batch: Vec::with_capacity(capacity),
        }
    }

    fn note_error(&mut self, line_no: u64, line: &[u8], err: &dyn std::fmt::Display) {
        if self.stats.error_count() <= self.config.error_log_limit as u64 {
            error!(line = line_no, preview = %preview(line), "Skipping line: {}", err);
        }
    }

    /// Parse one non-blank line and derive its version signal
    fn parse_line(line: &[u8]) -> Result<(RawMetadataRecord, i64)> {
        let text = std::str::from_utf8(line)
            .map_err(|e| SyncError::Validation(format!("invalid UTF-8: {}", e)))?;
        let record: RawMetadataRecord = serde_json::from_str(text)?;
        let update_date = record
            .update_date
            .as_deref()
            .ok_or_else(|| SyncError::VersionParse(format!("record {} has no update_date", record.id)))?;
        let timestamp = parse_update_date(update_date)?;
        Ok((record, timestamp))
    }

    async fn flush<S: ChunkSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let records = std::mem::replace(&mut self.batch, Vec::with_capacity(self.config.chunk_size.max(1)));
        let count = records.len();
        sink.flush(self.stats.accepted, records).await?;
        self.stats.chunks_flushed += 1;
        info!(sequence = self.stats.accepted, records = count, "Flushed chunk");
        Ok(())
    }

    /// Consume the whole stream
    ///
    /// Malformed lines are counted and skipped. A read failure or a sink
    /// failure aborts the pass.
    #[instrument(skip_all, fields(chunk_size = self.config.chunk_size))]
    pub async fn run<R, S>(mut self, mut reader: R, sink: &mut S) -> Result<DedupStats>
    where
        R: AsyncBufRead + Unpin + Send,
        S: ChunkSink + ?Sized,
    {
        let chunk_size = self.config.chunk_size.max(1);
        let mut buf = Vec::new();
        let mut line_no = 0u64;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| SyncError::StorageIo(format!("Snapshot read failed at line {}: {}", line_no + 1, e)))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            self.stats.lines_read += 1;

            let line = buf.trim_ascii();
            if line.is_empty() {
                self.stats.blank_lines += 1;
                continue;
            }

            let (record, timestamp) = match Self::parse_line(line) {
                Ok(parsed) => parsed,
                Err(SyncError::VersionParse(msg)) => {
                    self.stats.version_errors += 1;
                    self.note_error(line_no, line, &msg);
                    continue;
                }
                Err(err) => {
                    self.stats.parse_errors += 1;
                    self.note_error(line_no, line, &err);
                    continue;
                }
            };

            match self.state.admit(&record.id, timestamp) {
                Admission::Superseded => {
                    self.stats.superseded += 1;
                    continue;
                }
                Admission::Replaced => self.stats.replaced += 1,
                Admission::New => {}
            }

            self.stats.accepted += 1;
            self.batch.push(record);

            if self.batch.len() >= chunk_size {
                self.flush(sink).await?;
            }

            if let Some(cap) = self.config.max_records {
                if self.stats.accepted >= cap as u64 {
                    self.stats.capped = true;
                    info!(cap, "Reached record cap, stopping");
                    break;
                }
            }
        }

        self.flush(sink).await?;
        self.stats.unique_ids = self.state.len() as u64;

        info!(
            lines = self.stats.lines_read,
            accepted = self.stats.accepted,
            superseded = self.stats.superseded,
            errors = self.stats.error_count(),
            chunks = self.stats.chunks_flushed,
            "Deduplication finished"
        );

        Ok(self.stats)
    }
}

/// Sink that keeps every batch in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub chunks: Vec<(u64, Vec<RawMetadataRecord>)>,
}

#[async_trait]
impl ChunkSink for CollectingSink {
    async fn flush(&mut self, sequence: u64, records: Vec<RawMetadataRecord>) -> Result<()> {
        self.chunks.push((sequence, records));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    fn line(id: &str, date: &str) -> String {
        format!(r#"{{"id":"{}","title":"t-{}","update_date":"{}"}}"#, id, date, date)
    }

    async fn dedup(config: DedupConfig, body: String) -> (DedupStats, CollectingSink) {
        let mut sink = CollectingSink::default();
        let stats = StreamingDeduplicator::new(config)
            .run(Cursor::new(body.into_bytes()), &mut sink)
            .await
            .unwrap();
        (stats, sink)
    }

    #[test]
    fn test_admission_rules() {
        let mut state = DedupState::new();
        assert_eq!(state.admit("a", 10), Admission::New);
        assert_eq!(state.admit("a", 10), Admission::Replaced);
        assert_eq!(state.admit("a", 20), Admission::Replaced);
        assert_eq!(state.admit("a", 15), Admission::Superseded);
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_sequence_is_cumulative() {
        let body: String = (0..25).map(|i| line(&format!("id-{}", i), "2020-01-01") + "\n").collect();
        let config = DedupConfig { chunk_size: 10, ..DedupConfig::default() };

        let (stats, sink) = dedup(config, body).await;
        let sequences: Vec<u64> = sink.chunks.iter().map(|(s, _)| *s).collect();

        assert_eq!(sequences, vec![10, 20, 25]);
        assert_eq!(sink.chunks[2].1.len(), 5);
        assert_eq!(stats.accepted, 25);
        assert_eq!(stats.chunks_flushed, 3);
    }

    #[tokio::test]
    async fn test_superseded_record_is_skipped() {
        let body = [
            line("a", "2021-05-01"),
            line("a", "2020-01-01"),
            line("b", "2020-01-01"),
            line("a", "2021-05-01"),
        ]
        .join("\n");

        let (stats, sink) = dedup(DedupConfig::default(), body).await;
        let ids: Vec<&str> = sink.chunks[0].1.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.unique_ids, 2);
    }

    #[tokio::test]
    async fn test_blank_and_crlf_lines() {
        let body = format!("\n{}\r\n   \n{}\n", line("a", "2020-01-01"), line("b", "2020-01-01"));
        let (stats, _) = dedup(DedupConfig::default(), body).await;
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.blank_lines, 2);
        assert_eq!(stats.error_count(), 0);
    }

    #[tokio::test]
    async fn test_error_kinds_are_counted_separately() {
        let body = [
            line("a", "2020-01-01"),
            "{not json".to_string(),
            line("b", "someday"),
            r#"{"id":"c"}"#.to_string(),
        ]
        .join("\n");

        let (stats, _) = dedup(DedupConfig::default(), body).await;
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.version_errors, 2);
    }

    /// Counts events that carry a line preview
    struct SkippedLineCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SkippedLineCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().fields().field("preview").is_some() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn logged_errors(config: DedupConfig, body: String) -> (DedupStats, usize) {
        let counter = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(SkippedLineCounter(counter.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (stats, _) = dedup(config, body).await;
        (stats, counter.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_only_first_errors_are_logged() {
        let mut lines: Vec<String> = (0..25)
            .map(|i| match i % 3 {
                0 => format!("{{broken {}", i),
                1 => line(&format!("v-{}", i), "never"),
                _ => line(&format!("ok-{}", i), "2020-01-01"),
            })
            .collect();
        lines.push("{also broken".to_string());
        let body = lines.join("\n");

        let (stats, logged) = logged_errors(DedupConfig::default(), body.clone()).await;
        assert_eq!(stats.error_count(), 18);
        assert_eq!(logged, DEFAULT_ERROR_LOG_LIMIT);

        let config = DedupConfig {
            error_log_limit: 3,
            ..DedupConfig::default()
        };
        let (_, logged) = logged_errors(config, body).await;
        assert_eq!(logged, 3);
    }

    #[tokio::test]
    async fn test_errors_below_limit_are_all_logged() {
        let body = ["{x", "{y", &line("a", "2020-01-01")].join("\n");
        let (stats, logged) = logged_errors(DedupConfig::default(), body).await;
        assert_eq!(stats.parse_errors, 2);
        assert_eq!(logged, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_parse_error() {
        let mut body = line("a", "2020-01-01").into_bytes();
        body.extend_from_slice(b"\n\xff\xfe\n");
        let mut sink = CollectingSink::default();
        let stats = StreamingDeduplicator::new(DedupConfig::default())
            .run(Cursor::new(body), &mut sink)
            .await
            .unwrap();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.parse_errors, 1);
    }

    #[tokio::test]
    async fn test_max_records_cap() {
        let body: String = (0..50).map(|i| line(&format!("id-{}", i), "2020-01-01") + "\n").collect();
        let config = DedupConfig {
            chunk_size: 8,
            max_records: Some(20),
            ..DedupConfig::default()
        };

        let (stats, sink) = dedup(config, body).await;
        assert!(stats.capped);
        assert_eq!(stats.accepted, 20);
        assert_eq!(stats.lines_read, 20);
        assert_eq!(sink.chunks.last().unwrap().0, 20);
    }

    #[tokio::test]
    async fn test_empty_stream_flushes_nothing() {
        let (stats, sink) = dedup(DedupConfig::default(), String::new()).await;
        assert_eq!(stats, DedupStats::default());
        assert!(sink.chunks.is_empty());
    }
}
