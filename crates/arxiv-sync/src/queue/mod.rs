//! Chunk-ready notifications
//!
//! Delivery is at-least-once and unordered. A message stays invisible while a
//! consumer works on it and comes back if it is never acknowledged.

use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod memory;
pub mod sqs;

pub use config::QueueConfig;
pub use memory::InMemoryChunkQueue;
pub use sqs::SqsChunkQueue;

use crate::ingest::chunks::{parse_chunk_key, parse_run_prefix};

/// Reference to one chunk object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub version: i64,
    pub run_prefix: String,
    pub key: String,
    pub sequence: u64,
}

impl ChunkMessage {
    /// Decode a delivery body
    ///
    /// Accepts the JSON form written by [`ChunkQueue::publish`] as well as a
    /// bare chunk key, which is what manual replays put on the queue.
    pub fn from_body(body: &str) -> Result<Self> {
        let body = body.trim();

        if body.starts_with('{') {
            return serde_json::from_str(body)
                .map_err(|e| SyncError::Queue(format!("Malformed chunk message: {}", e)));
        }

        Self::from_key(body)
    }

    /// Rebuild a message from a chunk key such as `parsed_1719708664153/metadata-1000.json`
    pub fn from_key(key: &str) -> Result<Self> {
        let (run_prefix, sequence) = parse_chunk_key(key)
            .ok_or_else(|| SyncError::Queue(format!("Not a chunk key: '{}'", key)))?;
        let version = parse_run_prefix(run_prefix)
            .ok_or_else(|| SyncError::Queue(format!("Not a run prefix: '{}'", run_prefix)))?;

        Ok(Self {
            version,
            run_prefix: run_prefix.to_string(),
            key: key.to_string(),
            sequence,
        })
    }
}

/// A received message before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDelivery {
    pub body: String,
    /// Handle passed back to [`ChunkQueue::ack`]
    pub receipt: String,
}

#[async_trait]
pub trait ChunkQueue: Send + Sync {
    async fn publish(&self, message: &ChunkMessage) -> Result<()>;

    /// Receive up to `max` messages, waiting briefly when none are ready
    async fn receive(&self, max: usize) -> Result<Vec<RawDelivery>>;

    /// Acknowledge a processed delivery so it is not redelivered
    async fn ack(&self, receipt: &str) -> Result<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_body() {
        let message = ChunkMessage {
            version: 1_719_708_664_153,
            run_prefix: "parsed_1719708664153".into(),
            key: "parsed_1719708664153/metadata-2000.json".into(),
            sequence: 2000,
        };
        let body = serde_json::to_string(&message).unwrap();
        assert_eq!(ChunkMessage::from_body(&body).unwrap(), message);
    }

    #[test]
    fn test_from_bare_key() {
        let message = ChunkMessage::from_body(" parsed_42/metadata-1000.json\n").unwrap();
        assert_eq!(message.version, 42);
        assert_eq!(message.run_prefix, "parsed_42");
        assert_eq!(message.sequence, 1000);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(ChunkMessage::from_body("hello"), Err(SyncError::Queue(_))));
        assert!(matches!(ChunkMessage::from_body("{\"key\":1}"), Err(SyncError::Queue(_))));
        assert!(ChunkMessage::from_body("parsed_x/metadata-1.json").is_err());
    }
}
