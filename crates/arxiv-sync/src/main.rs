//! arxiv-sync - incremental arXiv metadata synchronization

use anyhow::{Context, Result};
use arxiv_sync::config::SyncConfig;
use arxiv_sync::ingest::{ChunkConsumer, ChunkOutcome, PipelineOrchestrator, RunOutcome};
use arxiv_sync::queue::{ChunkMessage, SqsChunkQueue};
use arxiv_sync::search::{papers_mapping, OpenSearchIndex, SearchConfig, SearchIndex};
use arxiv_sync::source::{DatasetSource, KaggleSource, LocalSnapshotSource};
use arxiv_sync::storage::S3ObjectStore;
use arxiv_sync_common::logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "arxiv-sync")]
#[command(author, version, about = "Version-gated arXiv metadata sync into a search index")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read this snapshot file instead of downloading from Kaggle
    #[arg(long, global = true)]
    snapshot_file: Option<PathBuf>,

    /// Version of --snapshot-file in epoch millis (defaults to its mtime)
    #[arg(long, global = true, requires = "snapshot_file")]
    snapshot_version: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Gate, deduplicate, index every chunk and advance the marker in-process
    Run,

    /// Gate, deduplicate and announce chunks on the queue
    Collect,

    /// Process chunk messages from the queue until interrupted
    Consume {
        /// Exit once the queue is empty instead of waiting for more
        #[arg(long)]
        drain: bool,
    },

    /// Process a single chunk, e.g. to replay a failed one
    ProcessChunk {
        /// Chunk key, e.g. parsed_1719708664153/metadata-1000.json
        #[arg(long)]
        key: String,
    },

    /// Create the search index with the paper mapping
    CreateIndex {
        /// Delete an existing index first
        #[arg(long)]
        recreate: bool,
    },
}

fn dataset_source(cli: &Cli, config: &SyncConfig) -> Result<Box<dyn DatasetSource>> {
    match &cli.snapshot_file {
        Some(path) => Ok(Box::new(LocalSnapshotSource::new(path, cli.snapshot_version))),
        None => {
            config.source.validate_for_kaggle()?;
            Ok(Box::new(KaggleSource::new(config.source.clone())?))
        }
    }
}

async fn orchestrator(config: &SyncConfig) -> Result<PipelineOrchestrator> {
    let store = S3ObjectStore::new(config.storage.clone()).await?;
    let search = OpenSearchIndex::new(&config.search)?;
    Ok(PipelineOrchestrator::new(
        Arc::new(store),
        Arc::new(search),
        config.search.index.clone(),
        config.pipeline.clone(),
    ))
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Skipped(decision) => info!(?decision, "Nothing to do"),
        RunOutcome::Collected { manifest, finalize } => info!(
            version = manifest.version,
            chunks = manifest.chunks.len(),
            accepted = manifest.dedup.accepted,
            ?finalize,
            "Collection finished"
        ),
        RunOutcome::Completed(summary) => info!(
            version = summary.version,
            indexed = summary.indexed,
            index_failed = summary.index_failed,
            validation_errors = summary.validation_errors,
            "Run completed"
        ),
        RunOutcome::Incomplete { done, total } => {
            error!(done, ?total, "Run finished without advancing the marker")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::for_binary("arxiv-sync", cli.verbose).merge_env()?;
    init_logging(&log_config)?;

    if let Command::CreateIndex { recreate } = cli.command {
        dotenvy::dotenv().ok();
        let search_config = SearchConfig::from_env()?;
        let search = OpenSearchIndex::new(&search_config)?;
        let created = search
            .ensure_index(&search_config.index, &papers_mapping(), recreate)
            .await?;
        info!(index = %search_config.index, created, "Index ready");
        return Ok(());
    }

    let config = SyncConfig::load().context("Failed to load configuration")?;
    let pipeline = orchestrator(&config).await?;

    match &cli.command {
        Command::Run => {
            let source = dataset_source(&cli, &config)?;
            let outcome = pipeline.run(source.as_ref()).await?;
            report(&outcome);
        }
        Command::Collect => {
            let source = dataset_source(&cli, &config)?;
            let queue = SqsChunkQueue::new(&config.queue).await?;
            let outcome = pipeline.collect(source.as_ref(), Some(&queue)).await?;
            report(&outcome);
        }
        Command::Consume { drain } => {
            let queue = SqsChunkQueue::new(&config.queue).await?;
            let consumer = ChunkConsumer::new(&pipeline, &queue)
                .with_batch_size(config.queue.max_messages.max(1) as usize);
            if *drain {
                consumer.drain().await?;
            } else {
                consumer
                    .run(async {
                        if let Err(err) = tokio::signal::ctrl_c().await {
                            error!("Failed to listen for shutdown signal: {}", err);
                        }
                    })
                    .await;
            }
        }
        Command::ProcessChunk { key } => {
            let message = ChunkMessage::from_key(key)?;
            match pipeline.process_chunk(&message).await? {
                ChunkOutcome::Processed(chunk) => {
                    info!(?chunk, "Chunk processed");
                    let finalize = pipeline.try_finalize(message.version).await?;
                    info!(?finalize, "Completion check");
                }
                ChunkOutcome::Stale { version, stored } => {
                    info!(version, stored, "Chunk belongs to a superseded run, nothing indexed")
                }
            }
        }
        Command::CreateIndex { .. } => {}
    }

    Ok(())
}
