//! arxiv-sync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the arxiv-sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`SyncError`] and the [`Result`] alias, one variant per failure scope
//! - **Types**: raw snapshot records and the canonical search documents derived from them
//! - **Time**: parsers for the timestamp formats found in the snapshot
//! - **Checksums**: SHA-256 digests for uploaded chunk objects
//! - **Logging**: tracing subscriber setup driven by `LOG_*` environment variables
//!
//! # Example
//!
//! ```no_run
//! use arxiv_sync_common::{time, Result};
//!
//! fn version_signal(update_date: &str) -> Result<i64> {
//!     time::parse_update_date(update_date)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SyncError};
