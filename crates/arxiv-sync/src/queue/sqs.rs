use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use aws_sdk_sqs::{config::Region, error::DisplayErrorContext, Client};
use tracing::{debug, info, instrument, warn};

use super::{ChunkMessage, ChunkQueue, QueueConfig, RawDelivery};

/// SQS-backed [`ChunkQueue`]
#[derive(Clone)]
pub struct SqsChunkQueue {
    client: Client,
    queue_url: String,
    wait_secs: i32,
    visibility_secs: i32,
}

impl SqsChunkQueue {
    pub async fn new(config: &QueueConfig) -> Result<Self> {
        let queue_url = config
            .queue_url
            .clone()
            .ok_or_else(|| SyncError::Config("CHUNK_QUEUE_URL must be set".into()))?;

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!("Queue client initialized for {}", queue_url);

        Ok(Self {
            client: Client::from_conf(builder.build()),
            queue_url,
            wait_secs: config.wait_secs,
            visibility_secs: config.visibility_secs,
        })
    }
}

fn queue_error<E: std::error::Error>(action: &str, err: E) -> SyncError {
    SyncError::Queue(format!("{}: {}", action, DisplayErrorContext(err)))
}

#[async_trait]
impl ChunkQueue for SqsChunkQueue {
    #[instrument(skip(self), fields(key = %message.key))]
    async fn publish(&self, message: &ChunkMessage) -> Result<()> {
        let body = serde_json::to_string(message)?;

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| queue_error("Failed to publish chunk message", e))?;

        debug!("Published chunk message");
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<RawDelivery>> {
        let max = max.clamp(1, 10) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max)
            .wait_time_seconds(self.wait_secs)
            .visibility_timeout(self.visibility_secs)
            .send()
            .await
            .map_err(|e| queue_error("Failed to receive chunk messages", e))?;

        let mut deliveries = Vec::new();
        for message in output.messages() {
            match (message.body(), message.receipt_handle()) {
                (Some(body), Some(receipt)) => deliveries.push(RawDelivery {
                    body: body.to_string(),
                    receipt: receipt.to_string(),
                }),
                _ => warn!(message_id = ?message.message_id(), "Message without body or receipt handle"),
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| queue_error("Failed to acknowledge chunk message", e))?;
        Ok(())
    }
}
