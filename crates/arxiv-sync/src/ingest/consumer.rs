//! Queue-driven chunk processing
//!
//! A delivery is acknowledged only after its chunk is indexed and the
//! completion check ran. Unacknowledged deliveries come back after the
//! visibility timeout, and reprocessing a chunk is idempotent.

use arxiv_sync_common::SyncError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::pipeline::{ChunkOutcome, FinalizeOutcome, PipelineOrchestrator};
use crate::queue::{ChunkMessage, ChunkQueue, RawDelivery};

const IDLE_BACKOFF: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    Processed { finalized: bool },
    Stale,
    Malformed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub received: usize,
    pub processed: usize,
    /// Bodies that were not chunk references; acknowledged and dropped
    pub malformed: usize,
    /// Chunks of runs older than the stored marker; acknowledged, not indexed
    pub stale: usize,
    /// Left unacknowledged for redelivery
    pub failed: usize,
    /// Runs whose marker was advanced by this consumer
    pub finalized: usize,
}

impl DrainReport {
    fn record(&mut self, handled: Handled) {
        match handled {
            Handled::Processed { finalized } => {
                self.processed += 1;
                if finalized {
                    self.finalized += 1;
                }
            }
            Handled::Stale => self.stale += 1,
            Handled::Malformed => self.malformed += 1,
            Handled::Failed => self.failed += 1,
        }
    }
}

pub struct ChunkConsumer<'a> {
    pipeline: &'a PipelineOrchestrator,
    queue: &'a dyn ChunkQueue,
    batch_size: usize,
    concurrency: usize,
}

impl<'a> ChunkConsumer<'a> {
    pub fn new(pipeline: &'a PipelineOrchestrator, queue: &'a dyn ChunkQueue) -> Self {
        let concurrency = pipeline.config().chunk_concurrency.max(1);
        Self {
            pipeline,
            queue,
            batch_size: concurrency.min(10),
            concurrency,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn handle(&self, delivery: RawDelivery) -> Handled {
        let message = match ChunkMessage::from_body(&delivery.body) {
            Ok(message) => message,
            Err(err) => {
                let preview: String = delivery.body.chars().take(100).collect();
                warn!(body = %preview, "Dropping unreadable message: {}", err);
                if let Err(err) = self.queue.ack(&delivery.receipt).await {
                    error!("Failed to acknowledge unreadable message: {}", err);
                }
                return Handled::Malformed;
            }
        };

        match self.pipeline.process_chunk(&message).await {
            Ok(ChunkOutcome::Processed(_)) => {}
            Ok(ChunkOutcome::Stale { .. }) => {
                return match self.queue.ack(&delivery.receipt).await {
                    Ok(()) => Handled::Stale,
                    Err(err) => {
                        error!(key = %message.key, "Failed to acknowledge stale chunk message: {}", err);
                        Handled::Failed
                    }
                };
            }
            Err(err) => {
                error!(key = %message.key, retryable = err.is_retryable(), "Chunk failed: {}", err);
                return Handled::Failed;
            }
        }

        let finalized = match self.pipeline.try_finalize(message.version).await {
            Ok(FinalizeOutcome::Advanced(summary)) => {
                info!(version = summary.version, indexed = summary.indexed, "Run finalized");
                true
            }
            Ok(FinalizeOutcome::Pending { done, total }) => {
                debug!(done, ?total, "Run still in progress");
                false
            }
            Ok(FinalizeOutcome::AlreadyAdvanced) => false,
            Err(err @ SyncError::MarkerRegression { .. }) => {
                // Nothing a redelivery could fix.
                error!("Run cannot be finalized: {}", err);
                false
            }
            Err(err) => {
                error!(key = %message.key, "Completion check failed, leaving message for redelivery: {}", err);
                return Handled::Failed;
            }
        };

        match self.queue.ack(&delivery.receipt).await {
            Ok(()) => Handled::Processed { finalized },
            Err(err) => {
                error!(key = %message.key, "Failed to acknowledge chunk message: {}", err);
                Handled::Failed
            }
        }
    }

    /// Receive one batch and process it; an empty report means the queue was empty
    pub async fn poll_once(&self) -> arxiv_sync_common::Result<DrainReport> {
        let deliveries = self.queue.receive(self.batch_size).await?;
        let mut report = DrainReport {
            received: deliveries.len(),
            ..DrainReport::default()
        };

        let handled: Vec<Handled> = stream::iter(deliveries)
            .map(|delivery| self.handle(delivery))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for h in handled {
            report.record(h);
        }
        Ok(report)
    }

    /// Process messages until the queue reports none ready
    #[instrument(skip(self))]
    pub async fn drain(&self) -> arxiv_sync_common::Result<DrainReport> {
        let mut total = DrainReport::default();

        loop {
            let batch = self.poll_once().await?;
            if batch.received == 0 {
                break;
            }
            total.received += batch.received;
            total.processed += batch.processed;
            total.malformed += batch.malformed;
            total.stale += batch.stale;
            total.failed += batch.failed;
            total.finalized += batch.finalized;
        }

        info!(
            received = total.received,
            processed = total.processed,
            failed = total.failed,
            malformed = total.malformed,
            stale = total.stale,
            "Queue drained"
        );
        Ok(total)
    }

    /// Long-running loop, stopped by `shutdown`
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(concurrency = self.concurrency, "Chunk consumer started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                polled = self.poll_once() => match polled {
                    Ok(report) if report.received == 0 => tokio::time::sleep(IDLE_BACKOFF).await,
                    Ok(report) => debug!(
                        processed = report.processed,
                        failed = report.failed,
                        "Batch handled"
                    ),
                    Err(err) => {
                        error!("Queue receive failed: {}", err);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }
}
