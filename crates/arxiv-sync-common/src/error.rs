//! Error types for arxiv-sync
//!
//! Variants map onto failure scopes: run-fatal (`SourceUnavailable`,
//! `StorageIo`, `Timeout`), single line (`VersionParse`) and single record
//! (`Validation`). Partial indexing failures are reported through counts,
//! never through this type.

use thiserror::Error;

/// Result type alias for arxiv-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for arxiv-sync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    #[error("Version parse error: {0}")]
    VersionParse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Search engine error: {0}")]
    Search(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Refusing to move version marker backwards: stored {stored}, attempted {attempted}")]
    MarkerRegression { stored: i64, attempted: i64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether re-running the whole invocation may succeed.
    ///
    /// Record-scoped errors are deterministic and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnavailable(_)
                | SyncError::StorageIo(_)
                | SyncError::Search(_)
                | SyncError::Queue(_)
                | SyncError::Timeout { .. }
                | SyncError::Io(_)
        )
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        SyncError::Timeout {
            operation: operation.into(),
            secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::StorageIo("reset".into()).is_retryable());
        assert!(SyncError::timeout("bulk upsert", 30).is_retryable());
        assert!(!SyncError::Validation("bad author".into()).is_retryable());
        assert!(!SyncError::VersionParse("2024-13-01".into()).is_retryable());
        assert!(!SyncError::MarkerRegression {
            stored: 2,
            attempted: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        let err = SyncError::timeout("fetch snapshot", 900);
        assert_eq!(err.to_string(), "fetch snapshot timed out after 900s");
    }
}
