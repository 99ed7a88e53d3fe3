//! arxiv-sync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Keeps a search index in sync with the arXiv metadata snapshot. A run only
//! does work when the upstream version moved past the stored marker; the
//! snapshot is then deduplicated in one streaming pass into chunk objects,
//! each chunk is normalized and bulk upserted, and the marker advances once
//! every chunk is done.
//!
//! # Capabilities
//!
//! Every external system sits behind a narrow trait with an in-memory
//! implementation for tests:
//!
//! - [`storage::ObjectStore`]: S3 or [`storage::InMemoryObjectStore`]
//! - [`source::DatasetSource`]: Kaggle, a local file, or [`source::StaticSource`]
//! - [`search::SearchIndex`]: OpenSearch or [`search::InMemorySearchIndex`]
//! - [`queue::ChunkQueue`]: SQS or [`queue::InMemoryChunkQueue`]
//!
//! # Example
//!
//! ```no_run
//! use arxiv_sync::config::PipelineConfig;
//! use arxiv_sync::ingest::PipelineOrchestrator;
//! use arxiv_sync::search::InMemorySearchIndex;
//! use arxiv_sync::source::LocalSnapshotSource;
//! use arxiv_sync::storage::InMemoryObjectStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = PipelineOrchestrator::new(
//!         Arc::new(InMemoryObjectStore::new()),
//!         Arc::new(InMemorySearchIndex::new()),
//!         "arxiv-papers",
//!         PipelineConfig::default(),
//!     );
//!     let source = LocalSnapshotSource::new("arxiv-metadata-oai-snapshot.json", Some(1_719_708_664_153));
//!     let outcome = pipeline.run(&source).await?;
//!     println!("{:?}", outcome.state());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ingest;
pub mod queue;
pub mod search;
pub mod source;
pub mod storage;

pub use config::{PipelineConfig, SyncConfig};
