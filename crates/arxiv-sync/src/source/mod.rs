//! Upstream dataset access
//!
//! A [`DatasetSource`] answers two questions: which version is the latest, and
//! what are its lines. Both failures are fatal for the run and surface as
//! [`SyncError::SourceUnavailable`](arxiv_sync_common::SyncError::SourceUnavailable).

use arxiv_sync_common::Result;
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncBufRead;

pub mod config;
pub mod kaggle;
pub mod local;
pub mod memory;

pub use config::SourceConfig;
pub use kaggle::KaggleSource;
pub use local::LocalSnapshotSource;
pub use memory::StaticSource;

/// Line-delimited snapshot stream
pub type SnapshotReader = Pin<Box<dyn AsyncBufRead + Send>>;

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Version token of the newest upstream revision, in epoch milliseconds
    async fn latest_version(&self) -> Result<i64>;

    /// Open the snapshot for a single front-to-back read
    async fn fetch_snapshot(&self) -> Result<SnapshotReader>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}
