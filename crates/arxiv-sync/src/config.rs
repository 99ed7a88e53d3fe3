//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ingest::dedup::{DedupConfig, DEFAULT_CHUNK_SIZE, DEFAULT_ERROR_LOG_LIMIT};
use crate::ingest::version_gate::MarkerSelection;
use crate::queue::QueueConfig;
use crate::search::SearchConfig;
use crate::source::SourceConfig;
use crate::storage::StorageConfig;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default prefix of marker objects (`{prefix}-{version}.json`).
pub const DEFAULT_MARKER_PREFIX: &str = "arxiv-metadata";

/// Default number of chunks transformed and indexed at once.
pub const DEFAULT_CHUNK_CONCURRENCY: usize = 4;

/// Default bound on any single external call, in seconds.
pub const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 900;

/// Pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub marker_prefix: String,
    pub chunk_size: usize,
    pub max_records: Option<usize>,
    pub error_log_limit: usize,
    /// Chunks indexed at once by `run` and by each consumer.
    ///
    /// Above 1, chunks of one run may land out of order: an id repeated in
    /// two chunks can end up holding the copy from the earlier chunk, even
    /// when the later one is newer. Use 1 when the newest copy must win.
    pub chunk_concurrency: usize,
    pub external_timeout_secs: u64,
    pub marker_selection: MarkerSelection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_records: None,
            error_log_limit: DEFAULT_ERROR_LOG_LIMIT,
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
            external_timeout_secs: DEFAULT_EXTERNAL_TIMEOUT_SECS,
            marker_selection: MarkerSelection::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, value)),
        Err(_) => Ok(default),
    }
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            marker_prefix: std::env::var("S3_FOLDER_PREFIX").unwrap_or(defaults.marker_prefix),
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size)?,
            max_records: match std::env::var("MAX_RECORDS") {
                Ok(v) if !v.trim().is_empty() => Some(
                    v.trim()
                        .parse()
                        .map_err(|_| anyhow::anyhow!("MAX_RECORDS has an invalid value: '{}'", v))?,
                ),
                _ => None,
            },
            error_log_limit: env_parse("ERROR_LOG_LIMIT", defaults.error_log_limit)?,
            chunk_concurrency: env_parse("CHUNK_CONCURRENCY", defaults.chunk_concurrency)?,
            external_timeout_secs: env_parse(
                "EXTERNAL_TIMEOUT_SECS",
                defaults.external_timeout_secs,
            )?,
            marker_selection: match std::env::var("MARKER_SELECTION") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.marker_selection,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.marker_prefix.is_empty() {
            anyhow::bail!("S3_FOLDER_PREFIX cannot be empty");
        }
        if self.marker_prefix.starts_with("parsed_") {
            anyhow::bail!("S3_FOLDER_PREFIX must not overlap the chunk namespace 'parsed_'");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("CHUNK_SIZE must be greater than 0");
        }
        if self.max_records == Some(0) {
            anyhow::bail!("MAX_RECORDS must be greater than 0 when set");
        }
        if self.chunk_concurrency == 0 {
            anyhow::bail!("CHUNK_CONCURRENCY must be greater than 0");
        }
        if self.external_timeout_secs == 0 {
            anyhow::bail!("EXTERNAL_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            chunk_size: self.chunk_size,
            max_records: self.max_records,
            error_log_limit: self.error_log_limit,
        }
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }
}

/// Full configuration of one process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub search: SearchConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
}

impl SyncConfig {
    /// Load configuration from environment (and `.env`) and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            storage: StorageConfig::from_env()?,
            source: SourceConfig::from_env()?,
            search: SearchConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}
